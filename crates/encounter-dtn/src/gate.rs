//! Connectivity gate
//!
//! Decides whether a node may start any transfer this tick (admission) and,
//! if so, which open contacts it may use (topology). The gate keeps two
//! snapshots pulled from external oracles:
//!
//! - the **neighbor snapshot**: peers the schedule places near this node
//! - the **failed set**: nodes disabled in the current slot
//!
//! Each snapshot is refreshed on its own cadence and replaced in full.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use encounter_core::{ConfigError, FailureOracle, NeighborOracle, PeerIdentity, SimTime};

use crate::energy::EnergyLedger;

/// Default seconds between neighbor snapshot refreshes
pub const DEFAULT_NEIGHBOR_INTERVAL: f64 = 600.0;

/// Default seconds between failed-set refreshes
pub const DEFAULT_FAILURE_INTERVAL: f64 = 300.0;

/// Topology rule applied to each contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GatePolicy {
    /// Allow only peers in the neighbor snapshot
    #[default]
    ScheduleOnly,
    /// Also allow any pair whose ordinals are both at or above `threshold`
    ///
    /// High-index nodes form a backbone that bypasses the schedule.
    Backbone { threshold: u32 },
}

/// Gate configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Topology rule
    pub policy: GatePolicy,
    /// Seconds between neighbor snapshot refreshes
    pub neighbor_interval: f64,
    /// Seconds between failed-set refreshes
    pub failure_interval: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            policy: GatePolicy::ScheduleOnly,
            neighbor_interval: DEFAULT_NEIGHBOR_INTERVAL,
            failure_interval: DEFAULT_FAILURE_INTERVAL,
        }
    }
}

impl GateConfig {
    /// One shared refresh interval for both snapshots
    pub fn with_interval(policy: GatePolicy, interval: f64) -> Self {
        Self {
            policy,
            neighbor_interval: interval,
            failure_interval: interval,
        }
    }

    /// Reject non-positive refresh intervals
    pub fn check(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("neighbor_interval", self.neighbor_interval),
            ("failure_interval", self.failure_interval),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { name, value });
            }
        }
        Ok(())
    }
}

/// Result of the per-tick admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The node may try to transfer this tick
    Open,
    /// Out of energy; the radio is off
    RadioOff,
    /// Listed in the current failed set
    Failed,
}

impl Admission {
    /// Whether any transfer may start
    pub fn is_open(&self) -> bool {
        matches!(self, Admission::Open)
    }
}

/// Per-node connectivity gate
#[derive(Debug, Clone)]
pub struct ConnectivityGate<I: PeerIdentity> {
    node: I,
    config: GateConfig,
    neighbors: Vec<I>,
    failed: HashSet<I>,
    next_neighbor_refresh: SimTime,
    next_failure_refresh: SimTime,
}

impl<I: PeerIdentity> ConnectivityGate<I> {
    /// Create a gate with empty snapshots, due for refresh immediately
    pub fn new(node: I, config: GateConfig) -> Result<Self, ConfigError> {
        config.check()?;
        Ok(Self {
            node,
            config,
            neighbors: Vec::new(),
            failed: HashSet::new(),
            next_neighbor_refresh: SimTime::ZERO,
            next_failure_refresh: SimTime::ZERO,
        })
    }

    /// Fresh gate for a replicated node: same configuration, empty snapshots
    pub fn replicate(&self, node: I) -> Self {
        Self {
            node,
            config: self.config,
            neighbors: Vec::new(),
            failed: HashSet::new(),
            next_neighbor_refresh: SimTime::ZERO,
            next_failure_refresh: SimTime::ZERO,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Current neighbor snapshot
    pub fn neighbors(&self) -> &[I] {
        &self.neighbors
    }

    /// Whether this node is in the current failed set
    pub fn is_failed(&self) -> bool {
        self.failed.contains(&self.node)
    }

    /// Re-pull whichever snapshots are due
    pub fn refresh(
        &mut self,
        now: SimTime,
        neighbors: &dyn NeighborOracle<I>,
        failures: &dyn FailureOracle<I>,
    ) {
        let slot = now.slot();

        if now >= self.next_neighbor_refresh {
            self.neighbors = neighbors.neighbors_at(&self.node, slot);
            self.next_neighbor_refresh = self.next_neighbor_refresh + self.config.neighbor_interval;
            trace!(node = %self.node, slot, count = self.neighbors.len(), "Neighbor snapshot refreshed");
        }

        if now >= self.next_failure_refresh {
            let was_failed = self.is_failed();
            self.failed = failures.failed_at(slot);
            self.next_failure_refresh = self.next_failure_refresh + self.config.failure_interval;

            match (was_failed, self.is_failed()) {
                (false, true) => info!(node = %self.node, slot, "Node failed"),
                (true, false) => info!(node = %self.node, slot, "Node recovered"),
                _ => {}
            }
        }
    }

    /// Admission check for this tick
    ///
    /// A failed node has its energy forced to zero.
    pub fn admit(&self, energy: &mut EnergyLedger<I>, now: SimTime) -> Admission {
        if energy.is_depleted() {
            trace!(node = %self.node, "Radio off");
            return Admission::RadioOff;
        }
        if self.is_failed() {
            energy.force_depleted(now);
            return Admission::Failed;
        }
        Admission::Open
    }

    /// Whether the topology rule allows a transfer to `peer`
    pub fn may_transfer(&self, peer: &I) -> bool {
        if self.neighbors.contains(peer) {
            return true;
        }

        match self.config.policy {
            GatePolicy::ScheduleOnly => false,
            GatePolicy::Backbone { threshold } => {
                let backbone = |id: &I| id.ordinal().is_some_and(|index| index >= threshold);
                let allowed = backbone(&self.node) && backbone(peer);
                if allowed {
                    debug!(node = %self.node, peer = %peer, threshold, "Backbone bypass");
                }
                allowed
            }
        }
    }
}
