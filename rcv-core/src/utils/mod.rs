//! Utility re-exports and helper macros for the RC car.
//!
//! This module re-exports the control core, timing, drive math and connection
//! handling, and provides a helper macro for static initialization:
//!
//! - `config`: tunables for steering, power, lights and timing
//! - `connection`: command interpreter and the picoserve WebSocket server
//! - `controllers`: actuators, lights, update signaling, battery and the
//!   vehicle control loop
//! - `math`: steering angle and drive duty derivations
//! - `safety`: connectivity watchdog and brake timer
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod config;
pub mod connection;
pub mod controllers;
pub mod math;
pub mod safety;

pub use config::VehicleConfig;
pub use connection::server::run as wss;
pub use controllers::VehicleController;
pub use embassy_time::*;

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: $crate::static_cell::StaticCell<$t> =
            $crate::static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
