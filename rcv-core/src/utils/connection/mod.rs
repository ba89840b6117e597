//! Module Exports
//!
//! This file exports the modules that sit between the control clients and
//! the control loop.
//!
//! # Modules
//! - `commands`: interprets text frames into `VehicleCommand`s.
//! - `server`: manages the HTTP/WebSocket server, routes and client sessions.

/// Module for interpreting operator command frames.
pub mod commands;
/// Module for managing the WebSocket server, including routes and connection
/// handling.
pub mod server;

pub use commands::VehicleCommand;
