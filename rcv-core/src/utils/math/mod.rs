//! Math utilities for the RC car.
//!
//! This module provides the stateless steering and drive derivations.

pub mod drive;
