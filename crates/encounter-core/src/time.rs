//! Simulated time
//!
//! The host simulator advances a monotonic clock measured in seconds. Oracles
//! and sampling schedules work on integer *slots*, the whole-second part of
//! that clock.

use std::fmt::Display;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// A point in simulated time, in seconds since the start of the run
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct SimTime(f64);

impl SimTime {
    /// The start of the simulation
    pub const ZERO: SimTime = SimTime(0.0);

    /// Create a time from seconds
    ///
    /// Non-finite or negative inputs collapse to [`SimTime::ZERO`] so that no
    /// NaN can leak into aging or energy arithmetic.
    pub fn from_secs(secs: f64) -> Self {
        if secs.is_finite() && secs > 0.0 {
            Self(secs)
        } else {
            Self::ZERO
        }
    }

    /// Seconds since the start of the run
    pub fn as_secs(&self) -> f64 {
        self.0
    }

    /// Integer time slot (whole seconds)
    pub fn slot(&self) -> u64 {
        self.0.floor() as u64
    }

    /// Seconds elapsed since `earlier`, or 0 if `earlier` is in the future
    pub fn since(&self, earlier: SimTime) -> f64 {
        (self.0 - earlier.0).max(0.0)
    }
}

impl Add<f64> for SimTime {
    type Output = SimTime;

    fn add(self, secs: f64) -> SimTime {
        SimTime::from_secs(self.0 + secs)
    }
}

impl Sub for SimTime {
    type Output = f64;

    fn sub(self, rhs: SimTime) -> f64 {
        self.0 - rhs.0
    }
}

impl From<u64> for SimTime {
    fn from(secs: u64) -> Self {
        SimTime::from_secs(secs as f64)
    }
}

impl Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_truncates() {
        assert_eq!(SimTime::from_secs(600.9).slot(), 600);
        assert_eq!(SimTime::ZERO.slot(), 0);
    }

    #[test]
    fn test_invalid_inputs_collapse_to_zero() {
        assert_eq!(SimTime::from_secs(f64::NAN), SimTime::ZERO);
        assert_eq!(SimTime::from_secs(-3.0), SimTime::ZERO);
        assert_eq!(SimTime::from_secs(f64::INFINITY), SimTime::ZERO);
    }

    #[test]
    fn test_arithmetic() {
        let t = SimTime::from_secs(10.0) + 5.5;
        assert_eq!(t.as_secs(), 15.5);
        assert_eq!(t - SimTime::from_secs(10.0), 5.5);
        assert_eq!(SimTime::from_secs(3.0).since(t), 0.0);
        assert_eq!(t.since(SimTime::from_secs(3.0)), 12.5);
    }

    #[test]
    fn test_from_u64() {
        assert_eq!(SimTime::from(300u64).as_secs(), 300.0);
    }
}
