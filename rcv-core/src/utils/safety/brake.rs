//! One-shot brake light timer.
//!
//! Armed when throttle goes from any non-zero value to exactly zero. The
//! window is never extended by repeated zero commands; only a fresh
//! non-zero to zero transition starts a new one.

use embassy_time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct BrakeTimer {
    window: Duration,
    deadline: Option<Instant>,
}

impl BrakeTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Record a throttle update and arm the window on a non-zero to zero edge.
    ///
    /// Returns `true` if the window was armed.
    pub fn on_throttle(
        &mut self,
        previous: i8,
        next: i8,
        now: Instant,
    ) -> bool {
        if previous != 0 && next == 0 {
            self.deadline = Some(now + self.window);
            true
        } else {
            false
        }
    }

    pub fn is_braking(
        &self,
        now: Instant,
    ) -> bool {
        self.deadline.is_some_and(|deadline| now < deadline)
    }

    /// Drop an expired window. Returns `true` if one was cleared.
    pub fn clear_expired(
        &mut self,
        now: Instant,
    ) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
