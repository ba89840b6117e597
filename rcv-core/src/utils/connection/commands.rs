//! Text command interpreter.
//!
//! The operator page sends plain, case-sensitive text frames:
//!
//! | Frame                   | Command                        |
//! |-------------------------|--------------------------------|
//! | `ALIVE`                 | `Heartbeat`                    |
//! | `JOY:<steer>,<throttle>`| `Joystick`                     |
//! | `MAXPOWER:<value>`      | `SetMaxPower` (clamped 20–255) |
//! | `HEAD_LOW` / `HEAD_ON`  | `SetHeadlight(Low)`            |
//! | `HEAD_HIGH`             | `SetHeadlight(High)`           |
//! | `HEAD_OFF`              | `SetHeadlight(Off)`            |
//!
//! Interpretation never fails: malformed numbers read as 0 and anything else
//! becomes `Unrecognized`.

use serde::{Deserialize, Serialize};

use crate::utils::{
    config::{MAX_POWER, MIN_POWER},
    controllers::lights::HeadlightMode,
    math::drive::clamp_command,
};

/// A single interpreted operator command.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "vc", rename_all = "snake_case")] // vc = vehicle command
pub enum VehicleCommand {
    /// Proof of life only.
    Heartbeat,
    /// Steering and throttle, both clamped to `[-100, 100]`.
    Joystick { steer: i8, throttle: i8 },
    /// Drive power ceiling, clamped to `[20, 255]`.
    SetMaxPower { value: u8 },
    SetHeadlight { mode: HeadlightMode },
    /// Anything else; still counts as proof of life.
    Unrecognized,
}

impl VehicleCommand {
    /// Interpret one text frame.
    pub fn parse(frame: &str) -> Self {
        let headlight = match frame {
            "ALIVE" => return VehicleCommand::Heartbeat,
            "HEAD_LOW" | "HEAD_ON" => Some(HeadlightMode::Low),
            "HEAD_HIGH" => Some(HeadlightMode::High),
            "HEAD_OFF" => Some(HeadlightMode::Off),
            _ => None,
        };
        if let Some(mode) = headlight {
            return VehicleCommand::SetHeadlight { mode };
        }

        if let Some(payload) = frame.strip_prefix("JOY:") {
            let (steer, throttle) = match payload.split_once(',') {
                Some((steer, throttle)) => (parse_lenient(steer), parse_lenient(throttle)),
                None => (parse_lenient(payload), 0),
            };
            return VehicleCommand::Joystick {
                steer: clamp_command(steer),
                throttle: clamp_command(throttle),
            };
        }

        if let Some(payload) = frame.strip_prefix("MAXPOWER:") {
            let value = parse_lenient(payload).clamp(i32::from(MIN_POWER), i32::from(MAX_POWER));
            return VehicleCommand::SetMaxPower { value: value as u8 };
        }

        VehicleCommand::Unrecognized
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, VehicleCommand::Heartbeat)
    }
}

/// Parse the leading integer of `text`.
///
/// Leading whitespace and one sign are accepted, digits are read up to the
/// first non-digit, and the result saturates at the `i32` bounds. Text with
/// no leading digits reads as 0.
pub fn parse_lenient(text: &str) -> i32 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let mut value: i64 = 0;
    for byte in digits.bytes().take_while(u8::is_ascii_digit) {
        value = (value * 10 + i64::from(byte - b'0')).min(i64::from(i32::MAX) + 1);
    }
    let value = if negative { -value } else { value };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
