//! Control and safety core for a WiFi-driven RC car on no-std embedded platforms.
//!
//! For a runnable host build, see the `rcv-app/mock-mcu` binary.
#![no_std]

pub mod utils;

#[doc(hidden)]
pub use static_cell;
