//! Connectivity watchdog.
//!
//! Every accepted command (heartbeats included) refreshes the watchdog. Once
//! the link has been silent for longer than the timeout the control loop
//! forces the drive motor to neutral; steering is left where it was.

use embassy_time::{Duration, Instant};

/// `true` iff no more than `timeout` has elapsed since `last_command`.
///
/// A `now` earlier than `last_command` counts as alive.
pub fn is_alive(
    now: Instant,
    last_command: Instant,
    timeout: Duration,
) -> bool {
    now.checked_duration_since(last_command)
        .map_or(true, |silence| silence <= timeout)
}

/// Tracks the last proof-of-life and the last observed link state.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    last_command: Instant,
    timeout: Duration,
    link_up: bool,
}

impl Watchdog {
    /// Start a watchdog that considers `now` the last proof-of-life.
    pub fn new(
        now: Instant,
        timeout: Duration,
    ) -> Self {
        Self {
            last_command: now,
            timeout,
            link_up: true,
        }
    }

    pub fn feed(
        &mut self,
        now: Instant,
    ) {
        self.last_command = now;
    }

    pub fn last_command(&self) -> Instant {
        self.last_command
    }

    pub fn is_alive(
        &self,
        now: Instant,
    ) -> bool {
        is_alive(now, self.last_command, self.timeout)
    }

    /// Evaluate the link at `now`, logging only on state changes.
    ///
    /// Returns whether the link is alive.
    pub fn poll(
        &mut self,
        now: Instant,
    ) -> bool {
        let alive = self.is_alive(now);
        if alive != self.link_up {
            if alive {
                tracing::info!("control link restored");
            } else {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis(),
                    "control link silent, stopping drive motor"
                );
            }
            self.link_up = alive;
        }
        alive
    }
}
