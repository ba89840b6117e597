//! Battery voltage gauge.
//!
//! Averages a burst of ADC samples from the 2S pack divider and converts them
//! to volts and a charge percentage. The latest reading is published to
//! `BATTERY_STATUS` for the `/vin` route; reading it has no effect on the
//! control loop.

use core::cell::Cell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embedded_hal::delay::DelayNs;
use serde::{Deserialize, Serialize};

/// Most recent battery reading, `None` until the first sample burst.
pub static BATTERY_STATUS: Mutex<CriticalSectionRawMutex, Cell<Option<BatteryStatus>>> =
    Mutex::new(Cell::new(None));

/// Samples averaged per reading.
const SAMPLES: u8 = 20;
/// Spacing between samples (µs).
const SAMPLE_SPACING_US: u32 = 200;
/// Raw ADC count observed at a full 8.4 V pack.
const RAW_AT_FULL: f32 = 1400.0;
const FULL_VOLTS: f32 = 8.4;
const EMPTY_VOLTS: f32 = 4.0;

/// Source of raw divider samples.
pub trait VoltageSampler {
    type Error: core::fmt::Debug;

    fn sample(&mut self) -> Result<u16, Self::Error>;
}

/// Battery status as served over HTTP.
///
/// Serialized as JSON, e.g. `{"voltage":7.53,"percent":80.0}`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct BatteryStatus {
    /// Pack voltage, two decimals.
    pub voltage: f32,
    /// Charge estimate in `[0, 100]`, whole percent.
    pub percent: f32,
}

impl BatteryStatus {
    /// Build a status from an averaged raw ADC count.
    pub fn from_raw(raw: f32) -> Self {
        let volts = raw * (FULL_VOLTS / RAW_AT_FULL);
        let clamped = volts.clamp(EMPTY_VOLTS, FULL_VOLTS);
        let percent =
            ((clamped - EMPTY_VOLTS) / (FULL_VOLTS - EMPTY_VOLTS) * 100.0).clamp(0.0, 100.0);
        Self {
            voltage: libm::roundf(volts * 100.0) / 100.0,
            percent: libm::roundf(percent),
        }
    }
}

pub struct BatteryMonitor<S, D> {
    sampler: S,
    delay: D,
}

impl<S, D> BatteryMonitor<S, D>
where
    S: VoltageSampler,
    D: DelayNs,
{
    pub fn new(
        sampler: S,
        delay: D,
    ) -> Self {
        Self { sampler, delay }
    }

    /// Take an averaged reading.
    pub fn read(&mut self) -> Result<BatteryStatus, S::Error> {
        let mut sum = 0u32;
        for _ in 0..SAMPLES {
            sum += u32::from(self.sampler.sample()?);
            self.delay.delay_us(SAMPLE_SPACING_US);
        }
        Ok(BatteryStatus::from_raw(sum as f32 / f32::from(SAMPLES)))
    }

    /// Take a reading and publish it to `BATTERY_STATUS`.
    pub fn refresh(&mut self) -> Result<BatteryStatus, S::Error> {
        let status = self.read()?;
        BATTERY_STATUS.lock(|cell| cell.set(Some(status)));
        tracing::debug!(voltage = status.voltage, percent = status.percent, "battery sampled");
        Ok(status)
    }
}

/// Latest published reading.
pub fn latest() -> Option<BatteryStatus> {
    BATTERY_STATUS.lock(Cell::get)
}
