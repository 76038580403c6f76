//! # Encounter DTN
//!
//! Per-node routing decision engine for opportunistic (delay-tolerant)
//! network simulation.
//!
//! Nodes only exchange data during pairwise contacts. On every simulated
//! tick this crate decides, for one node, whether it may transfer at all,
//! over which contacts, and which buffered message to offer first.
//!
//! ## Features
//!
//! - **Delivery predictability (PRoPHET)**: encounter-based estimates with
//!   transitive propagation and lazy time decay.
//!
//! - **Spray-and-wait**: replica counts attached to messages and split on
//!   every transfer (standard or binary).
//!
//! - **Energy accounting**: transmit, receive, and scan charges against a
//!   per-node budget, broadcast to subscribers on every change.
//!
//! - **Connectivity gating**: a scheduled-neighbor snapshot and a failed-node
//!   set pulled from external oracles, with an optional backbone bypass for
//!   high-index nodes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use encounter_core::{NodeId, SimTime};
//! use encounter_dtn::{Oracles, RouterConfig};
//! use rand::SeedableRng;
//!
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
//! let mut scheduler = RouterConfig::prophet().build(NodeId::node(3), Oracles::none(), &mut rng)?;
//!
//! // Once per tick, with the host's view of this node
//! let outcome = scheduler.tick(&mut host, SimTime::from_secs(60.0));
//! ```
//!
//! ## Architecture
//!
//! - [`prophet`]: Delivery-predictability model
//! - [`energy`]: Energy ledger and change notifications
//! - [`gate`]: Admission check and topology gate
//! - [`spray`]: Spray-and-wait replica accounting
//! - [`policy`]: Routing variants behind the [`RoutingPolicy`] trait
//! - [`scheduler`]: The per-tick orchestrator
//! - [`host`]: Traits the host simulator implements
//! - [`schedule`]: Text-backed neighbor and failure oracles
//! - [`aged`]: Lazily aged values

pub mod aged;
pub mod energy;
pub mod error;
pub mod gate;
pub mod host;
pub mod message;
pub mod policy;
pub mod prophet;
pub mod schedule;
pub mod scheduler;
pub mod spray;

// Re-export main types
pub use aged::{Aged, AgingRate, Decay};
pub use energy::{EnergyConfig, EnergyLedger, EnergyMode, InitialEnergy, TransferActivity};
pub use error::ScheduleError;
pub use gate::{Admission, ConnectivityGate, GateConfig, GatePolicy};
pub use host::{ContactId, OpenContact, PeerView, QueueMode, TransferHost, TransferStart};
pub use message::{Message, MessageId};
pub use policy::{
    AnyPolicy, Candidate, EpidemicPolicy, PolicyKind, ProphetPolicy, RoutingPolicy,
    SprayAndWaitPolicy,
};
pub use prophet::{PredictabilityReport, ProphetConfig, ProphetState};
pub use schedule::{FailureSchedule, NeighborSchedule};
pub use scheduler::{Oracles, TickOutcome, TransferScheduler};
pub use spray::{ReplicationLedger, SprayConfig, SprayMode};

use rand::Rng;
use serde::{Deserialize, Serialize};

use encounter_core::{ConfigError, PeerIdentity};

/// Index from which nodes form the backbone in the predictability preset
pub const DEFAULT_BACKBONE_THRESHOLD: u32 = 40;

/// Configuration for one node's routing engine
///
/// Combines the routing variant with the gate and energy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Routing variant
    pub policy: PolicyKind,
    /// Connectivity gate
    pub gate: GateConfig,
    /// Energy budget
    pub energy: EnergyConfig,
}

impl Default for RouterConfig {
    /// Plain epidemic routing behind a schedule-only gate, one shared refresh
    /// interval, no energy limit
    fn default() -> Self {
        Self {
            policy: PolicyKind::Epidemic,
            gate: GateConfig::with_interval(GatePolicy::ScheduleOnly, gate::DEFAULT_NEIGHBOR_INTERVAL),
            energy: EnergyConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Predictability routing with the backbone bypass
    pub fn prophet() -> Self {
        Self {
            policy: PolicyKind::Prophet(ProphetConfig::default()),
            gate: GateConfig {
                policy: GatePolicy::Backbone {
                    threshold: DEFAULT_BACKBONE_THRESHOLD,
                },
                ..GateConfig::default()
            },
            energy: EnergyConfig::default(),
        }
    }

    /// Standard spray-and-wait
    pub fn spray_and_wait() -> Self {
        Self {
            policy: PolicyKind::SprayAndWait(SprayConfig::default()),
            ..Self::default()
        }
    }

    /// Binary spray-and-wait
    pub fn binary_spray_and_wait() -> Self {
        Self {
            policy: PolicyKind::SprayAndWait(SprayConfig::binary(SprayConfig::default().initial_copies)),
            ..Self::default()
        }
    }

    /// Replace the energy settings
    pub fn with_energy(mut self, energy: EnergyConfig) -> Self {
        self.energy = energy;
        self
    }

    /// Replace the gate settings
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    /// Reject settings that cannot build a node
    pub fn check(&self) -> Result<(), ConfigError> {
        match &self.policy {
            PolicyKind::Epidemic => {}
            PolicyKind::Prophet(config) => config.check()?,
            PolicyKind::SprayAndWait(config) => config.check()?,
        }
        self.gate.check()?;
        self.energy.check()
    }

    /// Build the routing engine for `node`
    ///
    /// `rng` samples the starting energy level; build every node of a run
    /// from the same generator.
    pub fn build<I: PeerIdentity, R: Rng + ?Sized>(
        &self,
        node: I,
        oracles: Oracles<I>,
        rng: &mut R,
    ) -> Result<TransferScheduler<I, AnyPolicy<I>>, ConfigError> {
        self.check()?;
        let policy = self.policy.build(node.clone())?;
        TransferScheduler::new(node, policy, self.gate, self.energy.clone(), oracles, rng)
    }

    /// Validate settings that build but probably do not do what was meant
    ///
    /// An empty list means nothing looks suspicious.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        match &self.policy {
            PolicyKind::SprayAndWait(spray) if spray.initial_copies == 1 => {
                warnings.push(ConfigWarning::SingleCopySpray);
            }
            PolicyKind::Prophet(prophet) if prophet.transitivity_constant > 1.0 => {
                warnings.push(ConfigWarning::TransitivityAboveOne);
            }
            _ => {}
        }

        if self.gate.policy == (GatePolicy::Backbone { threshold: 0 }) {
            warnings.push(ConfigWarning::BackboneIncludesAll);
        }

        if self.energy.mode == EnergyMode::Unlimited && self.energy.charged_group.is_some() {
            warnings.push(ConfigWarning::ChargedGroupIgnored);
        }

        if self.energy.mode != EnergyMode::Unlimited && self.energy.scan_interval == 0.0 {
            warnings.push(ConfigWarning::ScanEveryTick);
        }

        warnings
    }

    /// Check if the configuration raises no warnings
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// Configuration warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A single initial copy never sprays; the source waits for the destination
    SingleCopySpray,
    /// Transitivity above 1 lets one propagation push predictability past 1
    TransitivityAboveOne,
    /// A backbone threshold of 0 bypasses the schedule for every pair
    BackboneIncludesAll,
    /// A charged group is set but energy is unlimited
    ChargedGroupIgnored,
    /// A zero scan interval charges a scan on every tick
    ScanEveryTick,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::SingleCopySpray => write!(f, "initial_copies of 1 never sprays"),
            ConfigWarning::TransitivityAboveOne => {
                write!(f, "transitivity_constant above 1 can push predictability past 1")
            }
            ConfigWarning::BackboneIncludesAll => {
                write!(f, "backbone threshold 0 bypasses the schedule for every node")
            }
            ConfigWarning::ChargedGroupIgnored => {
                write!(f, "charged_group has no effect with unlimited energy")
            }
            ConfigWarning::ScanEveryTick => write!(f, "scan_interval of 0 charges a scan every tick"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encounter_core::NodeId;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(11)
    }

    #[test]
    fn test_default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.policy, PolicyKind::Epidemic);
        assert_eq!(config.gate.policy, GatePolicy::ScheduleOnly);
        assert_eq!(config.gate.neighbor_interval, config.gate.failure_interval);
        assert_eq!(config.energy.mode, EnergyMode::Unlimited);
    }

    #[test]
    fn test_prophet_config() {
        let config = RouterConfig::prophet();
        assert!(matches!(config.policy, PolicyKind::Prophet(_)));
        assert_eq!(config.gate.policy, GatePolicy::Backbone { threshold: 40 });
        assert_eq!(config.gate.neighbor_interval, 600.0);
        assert_eq!(config.gate.failure_interval, 300.0);
    }

    #[test]
    fn test_spray_configs() {
        let standard = RouterConfig::spray_and_wait();
        let binary = RouterConfig::binary_spray_and_wait();
        assert!(matches!(
            standard.policy,
            PolicyKind::SprayAndWait(SprayConfig { mode: SprayMode::Standard, .. })
        ));
        assert!(matches!(
            binary.policy,
            PolicyKind::SprayAndWait(SprayConfig { mode: SprayMode::Binary, .. })
        ));
    }

    #[test]
    fn test_preset_configs_are_valid() {
        assert!(RouterConfig::default().is_valid());
        assert!(RouterConfig::prophet().is_valid());
        assert!(RouterConfig::spray_and_wait().is_valid());
        assert!(RouterConfig::binary_spray_and_wait().is_valid());
    }

    #[test]
    fn test_presets_build() {
        let mut rng = rng();
        for config in [
            RouterConfig::default(),
            RouterConfig::prophet(),
            RouterConfig::spray_and_wait(),
            RouterConfig::binary_spray_and_wait(),
        ] {
            let scheduler = config.build(NodeId::node(1), Oracles::none(), &mut rng).unwrap();
            assert_eq!(scheduler.node(), &NodeId::node(1));
        }
    }

    #[test]
    fn test_prophet_preset_exposes_model() {
        let scheduler = RouterConfig::prophet()
            .build(NodeId::node(1), Oracles::none(), &mut rng())
            .unwrap();
        assert!(scheduler.predictability().is_some());
        assert_eq!(scheduler.policy().name(), "prophet");
    }

    #[test]
    fn test_missing_energy_cost_is_fatal() {
        let config = RouterConfig::default().with_energy(EnergyConfig {
            mode: EnergyMode::Constrained,
            ..Default::default()
        });
        let err = config.build(NodeId::node(1), Oracles::none(), &mut rng()).unwrap_err();
        assert_eq!(err, ConfigError::Missing("scan_energy"));
    }

    #[test]
    fn test_zero_copies_is_fatal() {
        let config = RouterConfig {
            policy: PolicyKind::SprayAndWait(SprayConfig::binary(0)),
            ..Default::default()
        };
        assert_eq!(config.check(), Err(ConfigError::NoCopies));
    }

    #[test]
    fn test_warnings_detected() {
        let config = RouterConfig {
            policy: PolicyKind::SprayAndWait(SprayConfig::binary(1)),
            gate: GateConfig {
                policy: GatePolicy::Backbone { threshold: 0 },
                ..GateConfig::default()
            },
            energy: EnergyConfig {
                charged_group: Some('n'),
                ..Default::default()
            },
        };

        let warnings = config.validate();
        assert!(warnings.contains(&ConfigWarning::SingleCopySpray));
        assert!(warnings.contains(&ConfigWarning::BackboneIncludesAll));
        assert!(warnings.contains(&ConfigWarning::ChargedGroupIgnored));
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn test_warning_display() {
        assert_eq!(
            ConfigWarning::ScanEveryTick.to_string(),
            "scan_interval of 0 charges a scan every tick"
        );
    }
}
