//! Steering and drive derivations for a servo-steered, single-motor car.
//!
//! Both transforms are pure: the same inputs always produce the same outputs.
//!
//! # Example
//! ```rust
//! use rcv_core::utils::math::drive::{drive_output, steering_angle, DriveOutput};
//! assert_eq!(steering_angle(0, 45, 135), 90);
//! assert_eq!(drive_output(100, 50, 5), DriveOutput::Forward(50));
//! ```

/// Operator command range on both axes.
pub const COMMAND_RANGE: i32 = 100;

/// Clamp a raw operator value into `[-100, 100]`.
pub fn clamp_command(raw: i32) -> i8 {
    raw.clamp(-COMMAND_RANGE, COMMAND_RANGE) as i8
}

/// Requested state of the H-bridge.
///
/// At most one direction carries duty; `Coast` drives both inputs low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutput {
    Coast,
    Forward(u8),
    Reverse(u8),
}

impl DriveOutput {
    /// `(forward, backward)` duty pair.
    pub fn duties(self) -> (u8, u8) {
        match self {
            DriveOutput::Coast => (0, 0),
            DriveOutput::Forward(duty) => (duty, 0),
            DriveOutput::Reverse(duty) => (0, duty),
        }
    }
}

/// Map steering intent in `[-100, 100]` to a servo angle.
///
/// `angle = center + (steer / 100) * (right - left) / 2`, truncated toward the
/// center and clamped to `[left, right]`.
pub fn steering_angle(
    steer: i8,
    left: u8,
    right: u8,
) -> u8 {
    let (left, right) = (f32::from(left.min(right)), f32::from(left.max(right)));
    let center = ((left + right) / 2.0) as i32 as f32;
    let half = (right - left) / 2.0;
    let steer = f32::from(steer).clamp(-100.0, 100.0);
    let angle = (center + (steer / 100.0) * half) as i32 as f32;
    angle.clamp(left, right) as u8
}

/// Map throttle intent in `[-100, 100]` to an H-bridge state.
///
/// Magnitudes below `dead_zone` coast. Above it the magnitude is rescaled
/// linearly from `[0, 100]` to `[0, max_power]`.
pub fn drive_output(
    throttle: i8,
    max_power: u8,
    dead_zone: u8,
) -> DriveOutput {
    let magnitude = i32::from(throttle).unsigned_abs().min(COMMAND_RANGE as u32);
    if magnitude < u32::from(dead_zone) {
        return DriveOutput::Coast;
    }

    let duty = (magnitude * u32::from(max_power) / COMMAND_RANGE as u32)
        .min(u32::from(max_power)) as u8;
    if throttle > 0 {
        DriveOutput::Forward(duty)
    } else {
        DriveOutput::Reverse(duty)
    }
}
