//! PRoPHET delivery predictability
//!
//! PRoPHET uses encounter history to estimate delivery probabilities.
//! Nodes that are frequently encountered are more likely to be good
//! intermediaries for message delivery.
//!
//! Key concepts:
//! - **Delivery Predictability (P)**: Likelihood that this node can deliver to a destination
//! - **Encounter Updates**: When two nodes meet, their predictability for each other rises
//! - **Transitivity**: If A meets B and B knows C, A infers something about C
//! - **Aging**: Predictabilities decay lazily, by `gamma^k` for `k` elapsed time units,
//!   whenever the table is read
//!
//! Values are not capped: repeated transitive boosts can push an
//! entry above 1, as in the published algorithm.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use encounter_core::{ConfigError, PeerIdentity, SimTime};

use crate::aged::{Aged, AgingRate};

/// Delivery predictability initialization constant
pub const P_INIT: f64 = 0.75;
/// Default transitivity scaling constant
pub const DEFAULT_BETA: f64 = 0.25;
/// Delivery predictability aging constant
pub const GAMMA: f64 = 0.98;

/// PRoPHET configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProphetConfig {
    /// Predictability gained on each direct encounter (P_init)
    /// Default: 0.75
    pub initial_probability: f64,

    /// Aging constant (gamma), applied once per elapsed time unit
    /// Default: 0.98
    pub aging_constant: f64,

    /// Transitivity scaling factor (beta)
    /// Default: 0.25
    pub transitivity_constant: f64,

    /// How many simulated seconds make one aging time unit
    /// Default: 30
    pub seconds_in_time_unit: f64,
}

impl Default for ProphetConfig {
    fn default() -> Self {
        Self {
            initial_probability: P_INIT,
            aging_constant: GAMMA,
            transitivity_constant: DEFAULT_BETA,
            seconds_in_time_unit: 30.0,
        }
    }
}

impl ProphetConfig {
    /// Reject settings that would produce NaN or meaningless aging
    pub fn check(&self) -> Result<(), ConfigError> {
        if !(self.seconds_in_time_unit.is_finite() && self.seconds_in_time_unit > 0.0) {
            return Err(ConfigError::NotPositive {
                name: "seconds_in_time_unit",
                value: self.seconds_in_time_unit,
            });
        }
        for (name, value) in [
            ("initial_probability", self.initial_probability),
            ("aging_constant", self.aging_constant),
            ("transitivity_constant", self.transitivity_constant),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Negative { name, value });
            }
        }
        Ok(())
    }

    fn rate(&self) -> AgingRate {
        AgingRate {
            gamma: self.aging_constant,
            seconds_in_time_unit: self.seconds_in_time_unit,
        }
    }
}

/// PRoPHET predictability state for a node
///
/// Owned exclusively by its node. Other nodes only ever read it through a
/// shared borrow, using [`ProphetState::peek_at`] or
/// [`ProphetState::snapshot_at`], which compute aged values without
/// committing the aging.
#[derive(Debug, Clone)]
pub struct ProphetState<I: PeerIdentity> {
    /// Our node's identity
    local_id: I,
    /// Delivery predictability for each destination
    preds: Aged<HashMap<I, f64>>,
    /// Configuration
    config: ProphetConfig,
}

impl<I: PeerIdentity> ProphetState<I> {
    /// Create new PRoPHET state for a node
    pub fn new(local_id: I, config: ProphetConfig) -> Result<Self, ConfigError> {
        config.check()?;
        Ok(Self::unchecked(local_id, config))
    }

    /// Create with default configuration
    pub fn with_defaults(local_id: I) -> Self {
        Self::unchecked(local_id, ProphetConfig::default())
    }

    fn unchecked(local_id: I, config: ProphetConfig) -> Self {
        Self {
            local_id,
            preds: Aged::new(HashMap::new(), SimTime::ZERO),
            config,
        }
    }

    /// Get the local node's identity
    pub fn local_id(&self) -> &I {
        &self.local_id
    }

    /// Get the configuration
    pub fn config(&self) -> &ProphetConfig {
        &self.config
    }

    /// Get delivery predictability for a destination
    ///
    /// Ages the whole table to `now` first. Returns 0.0 if the destination
    /// is unknown.
    pub fn predictability_for(&mut self, destination: &I, now: SimTime) -> f64 {
        let rate = self.config.rate();
        self.preds
            .read_at(now, rate)
            .get(destination)
            .copied()
            .unwrap_or(0.0)
    }

    /// Aged predictability for a destination, without aging the table
    pub fn peek_at(&self, destination: &I, now: SimTime) -> f64 {
        let factor = self.preds.factor_at(now, self.config.rate());
        self.preds
            .stale()
            .get(destination)
            .map(|p| p * factor)
            .unwrap_or(0.0)
    }

    /// Aged copy of every entry, without aging the table
    pub fn snapshot_at(&self, now: SimTime) -> Vec<(I, f64)> {
        let factor = self.preds.factor_at(now, self.config.rate());
        self.preds
            .stale()
            .iter()
            .map(|(id, p)| (id.clone(), p * factor))
            .collect()
    }

    /// Record a direct encounter with a peer
    ///
    /// `P(a,b) = P(a,b)_old + (1 - P(a,b)_old) * P_init`
    pub fn encounter(&mut self, peer: &I, now: SimTime) {
        if peer == &self.local_id {
            return;
        }

        let p_init = self.config.initial_probability;
        let rate = self.config.rate();
        let preds = self.preds.read_at(now, rate);
        let p_old = preds.get(peer).copied().unwrap_or(0.0);
        let p_new = p_old + (1.0 - p_old) * p_init;
        preds.insert(peer.clone(), p_new);

        trace!(peer = %peer, p_old, p_new, "Direct predictability update");
    }

    /// Apply transitive predictability updates learned from an intermediary
    ///
    /// For each destination C the intermediary B knows, except ourselves:
    /// `P(a,c) = P(a,c)_old + (1 - P(a,c)_old) * P(a,b) * P(b,c) * beta`
    pub fn transitive_update(&mut self, intermediary: &I, intermediary_probs: &[(I, f64)], now: SimTime) {
        let beta = self.config.transitivity_constant;
        let p_to_intermediary = self.predictability_for(intermediary, now);

        let rate = self.config.rate();
        let preds = self.preds.read_at(now, rate);
        for (destination, p_int_to_dest) in intermediary_probs {
            if destination == &self.local_id {
                continue;
            }

            let p_old = preds.get(destination).copied().unwrap_or(0.0);
            let p_new = p_old + (1.0 - p_old) * p_to_intermediary * p_int_to_dest * beta;
            preds.insert(destination.clone(), p_new);
        }
    }

    /// Handle a contact coming up
    ///
    /// Raises our predictability for the peer, then propagates transitively
    /// through the peer's own table when we can see it.
    pub fn on_contact_up(&mut self, peer: &I, peer_state: Option<&ProphetState<I>>, now: SimTime) {
        self.encounter(peer, now);

        match peer_state {
            Some(other) => {
                let snapshot = other.snapshot_at(now);
                self.transitive_update(peer, &snapshot, now);
            }
            None => {
                trace!(peer = %peer, "Peer exposes no predictability table; skipping transitivity");
            }
        }
    }

    /// Get all known destinations with their predictabilities, aged to `now`
    pub fn all_probabilities(&mut self, now: SimTime) -> Vec<(I, f64)> {
        let rate = self.config.rate();
        self.preds
            .read_at(now, rate)
            .iter()
            .map(|(id, p)| (id.clone(), *p))
            .collect()
    }

    /// Get the number of known destinations
    pub fn known_destinations(&self) -> usize {
        self.preds.stale().len()
    }

    /// Clear all predictability data
    pub fn clear(&mut self) {
        self.preds = Aged::new(HashMap::new(), self.preds.last_tick());
    }

    /// Fresh state for a replicated node: same configuration, empty table
    pub fn replicate(&self, local_id: I) -> Self {
        Self::unchecked(local_id, self.config.clone())
    }

    /// Textual dump of the current table, aged to `now`
    pub fn report(&mut self, now: SimTime) -> PredictabilityReport<I> {
        let mut entries = self.all_probabilities(now);
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        PredictabilityReport {
            node: self.local_id.clone(),
            entries,
        }
    }
}

/// Diagnostic dump of a node's predictability table
#[derive(Debug, Clone, PartialEq)]
pub struct PredictabilityReport<I: PeerIdentity> {
    /// Node the table belongs to
    pub node: I,
    /// Entries sorted by destination
    pub entries: Vec<(I, f64)>,
}

impl<I: PeerIdentity> fmt::Display for PredictabilityReport<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} delivery prediction(s)", self.entries.len())?;
        for (node, p) in &self.entries {
            write!(f, "\n{} : {:.6}", node, p)?;
        }
        Ok(())
    }
}
