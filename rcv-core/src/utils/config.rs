//! Tunables for the RC car.
//!
//! `VehicleConfig::default()` matches the stock chassis: a 45°–135° steering
//! servo, an 8-bit H-bridge and 8-bit LED channels. Every field can be
//! overridden from JSON; missing fields keep their default.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// Lowest accepted drive power ceiling.
pub const MIN_POWER: u8 = 20;
/// Highest accepted drive power ceiling (full 8-bit duty).
pub const MAX_POWER: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Servo angle at full left lock (degrees).
    pub left_angle: u8,
    /// Servo angle at full right lock (degrees).
    pub right_angle: u8,
    /// Silence after which the drive motor is stopped (ms).
    pub watchdog_timeout_ms: u64,
    /// How long the brake light stays on after throttle returns to zero (ms).
    pub brake_window_ms: u64,
    /// Throttle magnitudes below this are treated as neutral.
    pub dead_zone: u8,
    /// Throttle below the negative of this lights the reverse lamp.
    pub reverse_threshold: u8,
    pub head_low_level: u8,
    pub head_high_level: u8,
    pub tail_dim_level: u8,
    pub tail_full_level: u8,
    /// Tail blink half-period while a firmware transfer is running (ms).
    pub update_blink_ms: u64,
    pub update_blink_high: u8,
    pub update_blink_low: u8,
    /// Control loop tick interval (ms).
    pub tick_ms: u64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            left_angle: 45,
            right_angle: 135,
            watchdog_timeout_ms: 200,
            brake_window_ms: 2000,
            dead_zone: 5,
            reverse_threshold: 5,
            head_low_level: 90,
            head_high_level: 255,
            tail_dim_level: 100,
            tail_full_level: 255,
            update_blink_ms: 300,
            update_blink_high: 255,
            update_blink_low: 20,
            tick_ms: 5,
        }
    }
}

impl VehicleConfig {
    /// Parse a JSON override; fields that are absent keep their default.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Servo angle with the wheels pointing straight ahead.
    pub fn center_angle(&self) -> u8 {
        ((u16::from(self.left_angle) + u16::from(self.right_angle)) / 2) as u8
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn brake_window(&self) -> Duration {
        Duration::from_millis(self.brake_window_ms)
    }

    pub fn update_blink_period(&self) -> Duration {
        Duration::from_millis(self.update_blink_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}
