//! Vehicle control loop.
//!
//! `VehicleController` owns the `VehicleState` and the actuators. Transport
//! tasks never touch either directly: they push `ControlEvent`s into
//! `CONTROL_CHANNEL` and the controller serves them one at a time between
//! ticks.
//!
//! - `actuators`: servo, H-bridge and light outputs
//! - `battery`: averaged pack voltage readings
//! - `lights`: tail light priority and head light levels
//! - `update`: tail light signaling during firmware transfers

pub mod actuators;
pub mod battery;
pub mod lights;
pub mod update;

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::{with_timeout, Instant};
use embedded_hal::delay::DelayNs;

pub use actuators::{Actuators, OutputSnapshot, PwmActuators};
pub use battery::{BatteryMonitor, BatteryStatus, VoltageSampler, BATTERY_STATUS};
pub use lights::{HeadlightMode, LightContext, TailLight};
pub use update::{UpdateOutcome, UpdatePhase, UpdateSignaling};

use crate::utils::{
    config::{VehicleConfig, MAX_POWER, MIN_POWER},
    connection::commands::VehicleCommand,
    math::drive::{drive_output, steering_angle, DriveOutput},
    safety::{BrakeTimer, Watchdog},
};

/// Channel used to hand events to the control loop (`ControlEvent` messages).
pub static CONTROL_CHANNEL: Channel<CriticalSectionRawMutex, ControlEvent, 16> = Channel::new();

/// Everything the control loop reacts to besides its own tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Command(VehicleCommand),
    /// A control client went away cleanly.
    Disconnected,
    UpdateStarted,
    UpdateFinished(UpdateOutcome),
}

/// Monotonic time source for the control loop.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// `Clock` backed by the embassy time driver.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Operator intent and safety timers.
#[derive(Debug, Clone, Copy)]
pub struct VehicleState {
    /// Steering intent in `[-100, 100]`.
    pub steer: i8,
    /// Throttle intent in `[-100, 100]`; sign is direction.
    pub throttle: i8,
    /// Drive duty ceiling in `[20, 255]`.
    pub max_power: u8,
    pub headlight: HeadlightMode,
    pub headlights_on: bool,
    /// Dim tail running lights wanted.
    pub running_lights_requested: bool,
    pub update_signaling_active: bool,
    pub watchdog: Watchdog,
    pub brake: BrakeTimer,
}

impl VehicleState {
    /// All-neutral state with the watchdog fed at `now`.
    pub fn new(
        cfg: &VehicleConfig,
        now: Instant,
    ) -> Self {
        Self {
            steer: 0,
            throttle: 0,
            max_power: MAX_POWER,
            headlight: HeadlightMode::Off,
            headlights_on: false,
            running_lights_requested: false,
            update_signaling_active: false,
            watchdog: Watchdog::new(now, cfg.watchdog_timeout()),
            brake: BrakeTimer::new(cfg.brake_window()),
        }
    }

    pub fn is_braking(
        &self,
        now: Instant,
    ) -> bool {
        self.brake.is_braking(now)
    }

    pub fn light_context(
        &self,
        now: Instant,
    ) -> LightContext {
        LightContext {
            update_active: self.update_signaling_active,
            braking: self.is_braking(now),
            throttle: self.throttle,
            headlights_on: self.headlights_on,
            running_requested: self.running_lights_requested,
        }
    }
}

pub struct VehicleController<A> {
    actuators: A,
    config: VehicleConfig,
    state: VehicleState,
    update: UpdateSignaling,
}

impl<A> VehicleController<A>
where
    A: Actuators,
{
    /// Create the controller and drive every output to its neutral position.
    pub fn new(
        actuators: A,
        config: VehicleConfig,
        now: Instant,
    ) -> Self {
        let mut ctrl = VehicleController {
            actuators,
            config,
            state: VehicleState::new(&config, now),
            update: UpdateSignaling::new(
                config.update_blink_period(),
                config.update_blink_high,
                config.update_blink_low,
            ),
        };

        if let Err(error) = ctrl.write_neutral() {
            tracing::warn!(?error, "failed to write startup outputs");
        }
        ctrl
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    pub fn update_phase(&self) -> UpdatePhase {
        self.update.phase()
    }

    /// Serve one control event.
    pub fn handle_event<D: DelayNs>(
        &mut self,
        event: ControlEvent,
        now: Instant,
        delay: &mut D,
    ) -> Result<(), A::Error> {
        match event {
            ControlEvent::Command(cmd) => self.on_command(cmd, now),
            ControlEvent::Disconnected => self.on_disconnect(now),
            ControlEvent::UpdateStarted => {
                self.on_update_started(now);
                Ok(())
            }
            ControlEvent::UpdateFinished(outcome) => self.on_update_finished(outcome, now, delay),
        }
    }

    /// Apply an interpreted command. Every command, recognized or not, feeds
    /// the watchdog.
    pub fn on_command(
        &mut self,
        cmd: VehicleCommand,
        now: Instant,
    ) -> Result<(), A::Error> {
        self.state.watchdog.feed(now);
        if !cmd.is_heartbeat() {
            tracing::debug!(?cmd, "command");
        }

        match cmd {
            VehicleCommand::Joystick { steer, throttle } => self.apply_joystick(steer, throttle, now),
            VehicleCommand::SetMaxPower { value } => {
                self.state.max_power = value.clamp(MIN_POWER, MAX_POWER);
                Ok(())
            }
            VehicleCommand::SetHeadlight { mode } => {
                let on = mode != HeadlightMode::Off;
                self.state.headlight = mode;
                self.state.headlights_on = on;
                self.state.running_lights_requested = on;
                self.actuators.set_headlight(mode.level(&self.config))?;
                self.refresh_taillight(now)
            }
            VehicleCommand::Heartbeat => Ok(()),
            VehicleCommand::Unrecognized => {
                tracing::warn!("unrecognized command ignored");
                Ok(())
            }
        }
    }

    /// Periodic evaluation, independent of command traffic.
    pub fn tick(
        &mut self,
        now: Instant,
    ) -> Result<(), A::Error> {
        let brake_expired = self.state.brake.clear_expired(now);

        if !self.state.watchdog.poll(now) {
            self.force_stop(now)?;
        } else if brake_expired {
            self.refresh_taillight(now)?;
        }

        self.update.tick(now, &mut self.actuators)
    }

    /// Clean transport disconnect: stop immediately instead of waiting for
    /// the watchdog.
    pub fn on_disconnect(
        &mut self,
        now: Instant,
    ) -> Result<(), A::Error> {
        tracing::info!("control client disconnected, stopping drive motor");
        self.force_stop(now)
    }

    pub fn on_update_started(
        &mut self,
        now: Instant,
    ) {
        self.update.start(now);
        self.state.update_signaling_active = self.update.is_active();
    }

    /// End update signaling. Blocks for the flourish, then hands the tail
    /// light back to the priority resolver.
    pub fn on_update_finished<D: DelayNs>(
        &mut self,
        outcome: UpdateOutcome,
        now: Instant,
        delay: &mut D,
    ) -> Result<(), A::Error> {
        let finished = self.update.finish(outcome, &mut self.actuators, delay);
        self.state.update_signaling_active = self.update.is_active();
        if finished? {
            self.refresh_taillight(now)?;
        }
        Ok(())
    }

    /// Serve events and tick forever.
    ///
    /// At most one event is handled per iteration and the tick runs at least
    /// once per `tick_interval`, so the watchdog and brake timer cannot
    /// starve.
    pub async fn run<C: Clock, D: DelayNs>(
        &mut self,
        clock: &C,
        delay: &mut D,
    ) -> ! {
        let receiver = CONTROL_CHANNEL.receiver();
        let interval = self.config.tick_interval();
        loop {
            if let Ok(event) = with_timeout(interval, receiver.receive()).await {
                if let Err(error) = self.handle_event(event, clock.now(), delay) {
                    tracing::error!(?error, ?event, "actuator write failed");
                }
            }
            if let Err(error) = self.tick(clock.now()) {
                tracing::error!(?error, "actuator write failed during tick");
            }
        }
    }

    fn apply_joystick(
        &mut self,
        steer: i8,
        throttle: i8,
        now: Instant,
    ) -> Result<(), A::Error> {
        let steer = steer.clamp(-100, 100);
        let throttle = throttle.clamp(-100, 100);

        self.state.steer = steer;
        self.state.brake.clear_expired(now);
        if self.state.brake.on_throttle(self.state.throttle, throttle, now) {
            tracing::debug!("brake window armed");
        }
        self.state.throttle = throttle;

        self.actuators.set_steering(steering_angle(
            steer,
            self.config.left_angle,
            self.config.right_angle,
        ))?;
        self.refresh_taillight(now)?;
        self.actuators.set_drive(drive_output(
            throttle,
            self.state.max_power,
            self.config.dead_zone,
        ))
    }

    /// Neutral throttle, no brake window, lights recomputed. Steering holds.
    fn force_stop(
        &mut self,
        now: Instant,
    ) -> Result<(), A::Error> {
        self.state.throttle = 0;
        self.state.brake.cancel();
        self.actuators.set_drive(DriveOutput::Coast)?;
        self.refresh_taillight(now)
    }

    fn refresh_taillight(
        &mut self,
        now: Instant,
    ) -> Result<(), A::Error> {
        let ctx = self.state.light_context(now);
        let tail = lights::resolve_tail(&ctx, self.config.reverse_threshold);
        match tail.level(&self.config) {
            Some(level) => self.actuators.set_taillight(level),
            None => Ok(()),
        }
    }

    fn write_neutral(&mut self) -> Result<(), A::Error> {
        self.actuators.set_steering(self.config.center_angle())?;
        self.actuators.set_drive(DriveOutput::Coast)?;
        self.actuators.set_headlight(0)?;
        self.actuators.set_taillight(0)
    }
}
