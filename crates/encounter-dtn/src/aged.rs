//! Lazily aged values
//!
//! [`Aged`] pairs a value with the simulated time it was last aged at.
//! Nothing ticks it eagerly: every read passes the caller's current time,
//! and the value is decayed by `gamma^k` for the `k` time units elapsed since
//! the previous read.

use std::collections::HashMap;
use std::hash::Hash;

use encounter_core::SimTime;

/// Values that can be scaled down by a decay factor
pub trait Decay {
    /// Multiply every component by `factor`
    fn decay(&mut self, factor: f64);
}

impl<K: Eq + Hash> Decay for HashMap<K, f64> {
    fn decay(&mut self, factor: f64) {
        for value in self.values_mut() {
            *value *= factor;
        }
    }
}

impl Decay for f64 {
    fn decay(&mut self, factor: f64) {
        *self *= factor;
    }
}

/// Exponential aging rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgingRate {
    /// Per-unit decay constant
    pub gamma: f64,
    /// Seconds in one aging time unit
    pub seconds_in_time_unit: f64,
}

impl AgingRate {
    /// Decay factor for `elapsed` seconds, or `None` when no time unit
    /// fraction has elapsed at all
    pub fn factor(&self, elapsed: f64) -> Option<f64> {
        let k = elapsed / self.seconds_in_time_unit;
        if k == 0.0 || !k.is_finite() {
            return None;
        }
        Some(self.gamma.powf(k))
    }
}

/// A value with an explicit last-aged timestamp
#[derive(Debug, Clone)]
pub struct Aged<T> {
    value: T,
    last_tick: SimTime,
}

impl<T: Decay> Aged<T> {
    /// Wrap a value aged as of `at`
    pub fn new(value: T, at: SimTime) -> Self {
        Self {
            value,
            last_tick: at,
        }
    }

    /// Age the value to `now` and return it for reading or updating
    pub fn read_at(&mut self, now: SimTime, rate: AgingRate) -> &mut T {
        if let Some(factor) = rate.factor(now.since(self.last_tick)) {
            self.value.decay(factor);
            self.last_tick = now;
        }
        &mut self.value
    }

    /// Factor the stored value would be scaled by if read at `now`
    ///
    /// Lets a caller compute aged values without mutating, for example when
    /// reading a peer's state through a shared borrow.
    pub fn factor_at(&self, now: SimTime, rate: AgingRate) -> f64 {
        rate.factor(now.since(self.last_tick)).unwrap_or(1.0)
    }

    /// The stored value as of the last aging, without aging it
    pub fn stale(&self) -> &T {
        &self.value
    }

    /// When the value was last aged
    pub fn last_tick(&self) -> SimTime {
        self.last_tick
    }
}
