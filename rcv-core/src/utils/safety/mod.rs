//! Safety timers for the drive train.
//!
//! - `watchdog`: decides whether the control link is still alive.
//! - `brake`: one-shot brake light window armed when throttle drops to zero.

pub mod brake;
pub mod watchdog;

pub use brake::BrakeTimer;
pub use watchdog::{is_alive, Watchdog};
