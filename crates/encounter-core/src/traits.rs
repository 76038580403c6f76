//! Core traits for the Encounter routing engine
//!
//! ## Key Traits
//!
//! - [`Clock`]: Simulated time source, advanced by the host
//! - [`NeighborOracle`]: Which peers a node is scheduled to be near
//! - [`FailureOracle`]: Which nodes are disabled

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::identity::PeerIdentity;
use crate::time::SimTime;

/// Time abstraction
///
/// The host simulator owns time; the engine only ever reads it.
pub trait Clock: Send + Sync {
    /// Get the current simulated time
    fn now(&self) -> SimTime;
}

/// Clock advanced by hand
///
/// Clones share the same underlying time, so a driver can hand one clone to
/// every node and advance them all at once.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock at the given time
    pub fn starting_at(time: SimTime) -> Self {
        let clock = Self::new();
        clock.set(time);
        clock
    }

    /// Jump to the given time
    pub fn set(&self, time: SimTime) {
        self.bits.store(time.as_secs().to_bits(), Ordering::SeqCst);
    }

    /// Advance by `secs` seconds
    pub fn advance(&self, secs: f64) -> SimTime {
        let next = self.now() + secs;
        self.set(next);
        next
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SimTime {
        SimTime::from_secs(f64::from_bits(self.bits.load(Ordering::SeqCst)))
    }
}

/// Scheduled-neighbor lookup
///
/// Given a node and an integer time slot, returns the ordered list of peers
/// that node is scheduled to be near. An empty list means no schedule data.
pub trait NeighborOracle<I: PeerIdentity> {
    /// Peers scheduled near `node` at `slot`
    fn neighbors_at(&self, node: &I, slot: u64) -> Vec<I>;
}

/// Failed-node lookup
///
/// Given an integer time slot, returns the set of disabled nodes.
pub trait FailureOracle<I: PeerIdentity> {
    /// Nodes disabled at `slot`
    fn failed_at(&self, slot: u64) -> HashSet<I>;
}

/// Oracle that never reports anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSchedule;

impl<I: PeerIdentity> NeighborOracle<I> for NoSchedule {
    fn neighbors_at(&self, _node: &I, _slot: u64) -> Vec<I> {
        Vec::new()
    }
}

impl<I: PeerIdentity> FailureOracle<I> for NoSchedule {
    fn failed_at(&self, _slot: u64) -> HashSet<I> {
        HashSet::new()
    }
}
