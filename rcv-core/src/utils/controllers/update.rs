//! Tail light signaling during firmware transfers.
//!
//! `Idle -> Active` on transfer start. While `Active` the tail light toggles
//! between a high and a low level every blink period, whatever the driving
//! state. On transfer end the machine passes through `Finishing`, plays a
//! fixed blocking flourish and returns to `Idle`.

use embassy_time::{Duration, Instant};
use embedded_hal::delay::DelayNs;
use serde::{Deserialize, Serialize};

use super::actuators::Actuators;

/// How a firmware transfer ended.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    Active { last_toggle: Instant, lit: bool },
    Finishing,
}

/// One step of the completion flourish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlourishStep {
    pub level: u8,
    pub hold_ms: u32,
}

const FLASH_ON: FlourishStep = FlourishStep {
    level: 255,
    hold_ms: 120,
};
const FLASH_OFF: FlourishStep = FlourishStep {
    level: 0,
    hold_ms: 120,
};

/// Six full on/off pulses.
pub const FLOURISH: [FlourishStep; 12] = [
    FLASH_ON, FLASH_OFF, FLASH_ON, FLASH_OFF, FLASH_ON, FLASH_OFF, FLASH_ON, FLASH_OFF, FLASH_ON,
    FLASH_OFF, FLASH_ON, FLASH_OFF,
];

/// Total time the flourish blocks the caller.
pub const fn flourish_duration() -> Duration {
    let mut total = 0u64;
    let mut i = 0;
    while i < FLOURISH.len() {
        total += FLOURISH[i].hold_ms as u64;
        i += 1;
    }
    Duration::from_millis(total)
}

pub struct UpdateSignaling {
    phase: UpdatePhase,
    period: Duration,
    high: u8,
    low: u8,
}

impl UpdateSignaling {
    pub fn new(
        period: Duration,
        high: u8,
        low: u8,
    ) -> Self {
        Self {
            phase: UpdatePhase::Idle,
            period,
            high,
            low,
        }
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    /// `true` while the tail light belongs to update signaling.
    pub fn is_active(&self) -> bool {
        !matches!(self.phase, UpdatePhase::Idle)
    }

    /// Enter `Active`. Returns `false` if a transfer was already running.
    pub fn start(
        &mut self,
        now: Instant,
    ) -> bool {
        if self.is_active() {
            tracing::warn!("firmware transfer start while already signaling, ignored");
            return false;
        }
        tracing::info!("firmware transfer started, tail light signaling");
        self.phase = UpdatePhase::Active {
            last_toggle: now,
            lit: false,
        };
        true
    }

    /// Toggle the tail light once a full blink period has elapsed.
    pub fn tick<A: Actuators>(
        &mut self,
        now: Instant,
        actuators: &mut A,
    ) -> Result<(), A::Error> {
        if let UpdatePhase::Active { last_toggle, lit } = self.phase {
            let elapsed = now
                .checked_duration_since(last_toggle)
                .unwrap_or(Duration::from_ticks(0));
            if elapsed >= self.period {
                let lit = !lit;
                self.phase = UpdatePhase::Active {
                    last_toggle: now,
                    lit,
                };
                actuators.set_taillight(if lit { self.high } else { self.low })?;
            }
        }
        Ok(())
    }

    /// Stop blinking and play the flourish, blocking for
    /// [`flourish_duration`]. The machine is back in `Idle` afterwards even if
    /// a write failed. Returns `false` if no transfer was running.
    pub fn finish<A: Actuators, D: DelayNs>(
        &mut self,
        outcome: UpdateOutcome,
        actuators: &mut A,
        delay: &mut D,
    ) -> Result<bool, A::Error> {
        if !matches!(self.phase, UpdatePhase::Active { .. }) {
            tracing::warn!(?outcome, "firmware transfer finish without start, ignored");
            return Ok(false);
        }

        tracing::info!(?outcome, "firmware transfer finished");
        self.phase = UpdatePhase::Finishing;
        let played = play_flourish(actuators, delay);
        self.phase = UpdatePhase::Idle;
        played.map(|()| true)
    }
}

fn play_flourish<A: Actuators, D: DelayNs>(
    actuators: &mut A,
    delay: &mut D,
) -> Result<(), A::Error> {
    for step in FLOURISH {
        actuators.set_taillight(step.level)?;
        delay.delay_ms(step.hold_ms);
    }
    Ok(())
}
