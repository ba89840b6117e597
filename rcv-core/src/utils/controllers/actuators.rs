//! Actuator interface for the RC car.
//!
//! The control loop only talks to the `Actuators` trait. `PwmActuators` binds
//! it to five `embedded_hal::pwm::SetDutyCycle` channels: the steering servo,
//! the two H-bridge inputs and the head/tail light drivers.

use embedded_hal::pwm::SetDutyCycle;

use crate::utils::math::drive::DriveOutput;

/// Setter-only view of the physical outputs.
pub trait Actuators {
    type Error: core::fmt::Debug;

    /// Move the steering servo to `angle` degrees.
    fn set_steering(
        &mut self,
        angle: u8,
    ) -> Result<(), Self::Error>;

    /// Drive the H-bridge. Implementations must zero the inactive direction
    /// before energizing the active one.
    fn set_drive(
        &mut self,
        drive: DriveOutput,
    ) -> Result<(), Self::Error>;

    fn set_headlight(
        &mut self,
        level: u8,
    ) -> Result<(), Self::Error>;

    fn set_taillight(
        &mut self,
        level: u8,
    ) -> Result<(), Self::Error>;
}

/// Last values written to each output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSnapshot {
    pub steering: u8,
    pub drive: DriveOutput,
    pub headlight: u8,
    pub taillight: u8,
}

impl Default for OutputSnapshot {
    fn default() -> Self {
        Self {
            steering: 90,
            drive: DriveOutput::Coast,
            headlight: 0,
            taillight: 0,
        }
    }
}

/// Hobby servo timing.
#[derive(Debug, Clone, Copy)]
pub struct ServoTiming {
    /// Pulse width at 0° (µs).
    pub min_pulse_us: u16,
    /// Pulse width at 180° (µs).
    pub max_pulse_us: u16,
    /// Frame period (µs), 20 ms for 50 Hz.
    pub period_us: u16,
}

impl Default for ServoTiming {
    fn default() -> Self {
        Self {
            min_pulse_us: 1000,
            max_pulse_us: 2000,
            period_us: 20_000,
        }
    }
}

impl ServoTiming {
    /// Pulse width for `angle` degrees, saturating at 180°.
    pub fn pulse_us(
        &self,
        angle: u8,
    ) -> u16 {
        let angle = u32::from(angle.min(180));
        let span = u32::from(self.max_pulse_us.saturating_sub(self.min_pulse_us));
        self.min_pulse_us + (angle * span / 180) as u16
    }
}

/// `Actuators` over PWM channels sharing one error type.
pub struct PwmActuators<S, F, B, H, T> {
    servo: S,
    forward: F,
    backward: B,
    head: H,
    tail: T,
    timing: ServoTiming,
    last: OutputSnapshot,
}

impl<S, F, B, H, T, E> PwmActuators<S, F, B, H, T>
where
    S: SetDutyCycle<Error = E>,
    F: SetDutyCycle<Error = E>,
    B: SetDutyCycle<Error = E>,
    H: SetDutyCycle<Error = E>,
    T: SetDutyCycle<Error = E>,
{
    pub fn new(
        servo: S,
        forward: F,
        backward: B,
        head: H,
        tail: T,
        timing: ServoTiming,
    ) -> Self {
        Self {
            servo,
            forward,
            backward,
            head,
            tail,
            timing,
            last: OutputSnapshot::default(),
        }
    }

    pub fn last(&self) -> OutputSnapshot {
        self.last
    }
}

/// Write an 8-bit level as a fraction of the channel's full duty.
fn write_level<P: SetDutyCycle>(
    pin: &mut P,
    level: u8,
) -> Result<(), P::Error> {
    pin.set_duty_cycle_fraction(u16::from(level), u16::from(u8::MAX))
}

impl<S, F, B, H, T, E> Actuators for PwmActuators<S, F, B, H, T>
where
    S: SetDutyCycle<Error = E>,
    F: SetDutyCycle<Error = E>,
    B: SetDutyCycle<Error = E>,
    H: SetDutyCycle<Error = E>,
    T: SetDutyCycle<Error = E>,
    E: core::fmt::Debug,
{
    type Error = E;

    fn set_steering(
        &mut self,
        angle: u8,
    ) -> Result<(), E> {
        let pulse = self.timing.pulse_us(angle);
        self.servo
            .set_duty_cycle_fraction(pulse, self.timing.period_us)?;
        self.last.steering = angle;
        Ok(())
    }

    fn set_drive(
        &mut self,
        drive: DriveOutput,
    ) -> Result<(), E> {
        match drive {
            DriveOutput::Coast => {
                self.forward.set_duty_cycle_fully_off()?;
                self.backward.set_duty_cycle_fully_off()?;
            }
            DriveOutput::Forward(duty) => {
                self.backward.set_duty_cycle_fully_off()?;
                write_level(&mut self.forward, duty)?;
            }
            DriveOutput::Reverse(duty) => {
                self.forward.set_duty_cycle_fully_off()?;
                write_level(&mut self.backward, duty)?;
            }
        }
        self.last.drive = drive;
        Ok(())
    }

    fn set_headlight(
        &mut self,
        level: u8,
    ) -> Result<(), E> {
        write_level(&mut self.head, level)?;
        self.last.headlight = level;
        Ok(())
    }

    fn set_taillight(
        &mut self,
        level: u8,
    ) -> Result<(), E> {
        write_level(&mut self.tail, level)?;
        self.last.taillight = level;
        Ok(())
    }
}
