//! Head and tail light resolution.
//!
//! Tail light priority, first match wins:
//!
//! 1. firmware update signaling (handled by `update`, the resolver yields)
//! 2. active brake window: full
//! 3. reversing: full
//! 4. running lights requested: dim
//! 5. off

use serde::{Deserialize, Serialize};

use crate::utils::config::VehicleConfig;

/// Head light beam selected by the operator.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HeadlightMode {
    #[default]
    Off,
    Low,
    High,
}

impl HeadlightMode {
    pub fn level(
        self,
        cfg: &VehicleConfig,
    ) -> u8 {
        match self {
            HeadlightMode::Off => 0,
            HeadlightMode::Low => cfg.head_low_level,
            HeadlightMode::High => cfg.head_high_level,
        }
    }
}

/// Inputs of the tail light decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightContext {
    pub update_active: bool,
    pub braking: bool,
    pub throttle: i8,
    pub headlights_on: bool,
    pub running_requested: bool,
}

/// Resolved tail light state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailLight {
    /// Update signaling owns the tail light; write nothing.
    Deferred,
    Braking,
    Reverse,
    DimRunning,
    Off,
}

impl TailLight {
    /// PWM level for this state, `None` when the resolver yields.
    pub fn level(
        self,
        cfg: &VehicleConfig,
    ) -> Option<u8> {
        match self {
            TailLight::Deferred => None,
            TailLight::Braking | TailLight::Reverse => Some(cfg.tail_full_level),
            TailLight::DimRunning => Some(cfg.tail_dim_level),
            TailLight::Off => Some(0),
        }
    }
}

pub fn resolve_tail(
    ctx: &LightContext,
    reverse_threshold: u8,
) -> TailLight {
    if ctx.update_active {
        TailLight::Deferred
    } else if ctx.braking {
        TailLight::Braking
    } else if i16::from(ctx.throttle) < -i16::from(reverse_threshold) {
        TailLight::Reverse
    } else if ctx.headlights_on || ctx.running_requested {
        TailLight::DimRunning
    } else {
        TailLight::Off
    }
}
