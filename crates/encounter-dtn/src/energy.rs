//! Energy ledger
//!
//! Tracks a node's remaining energy and what it was spent on. Three causes
//! are charged once per tick:
//!
//! - **transmit**: the whole interval since the previous tick, while at
//!   least one outbound transfer is active
//! - **receive**: same, while receiving
//! - **scan**: a fixed cost once every `scan_interval` seconds
//!
//! Charges before the warmup time are ignored. The level never drops below
//! zero; a node at zero keeps accepting charges but can no longer start
//! transfers. Every change to the level is broadcast to subscribers.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use encounter_core::{ConfigError, EnergyCause, EnergyEvent, PeerIdentity, SimTime};

/// Capacity of the energy-event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How a node's starting energy is chosen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InitialEnergy {
    /// Start at exactly this level
    Fixed(f64),
    /// Sample uniformly from the closed interval
    Uniform { min: f64, max: f64 },
}

impl InitialEnergy {
    /// Build from one value (fixed) or two values (range)
    pub fn from_values(values: &[f64]) -> Result<Self, ConfigError> {
        let initial = match values {
            [level] => InitialEnergy::Fixed(*level),
            [min, max] => InitialEnergy::Uniform {
                min: *min,
                max: *max,
            },
            other => return Err(ConfigError::EnergyArity(other.len())),
        };
        initial.check()?;
        Ok(initial)
    }

    fn check(&self) -> Result<(), ConfigError> {
        match *self {
            InitialEnergy::Fixed(level) => non_negative("initial_energy", level),
            InitialEnergy::Uniform { min, max } => {
                non_negative("initial_energy", min)?;
                non_negative("initial_energy", max)?;
                if min > max {
                    return Err(ConfigError::InvertedRange { min, max });
                }
                Ok(())
            }
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            InitialEnergy::Fixed(level) => level,
            InitialEnergy::Uniform { min, max } => rng.random_range(min..=max),
        }
    }
}

/// Whether the ledger spends energy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnergyMode {
    /// Energy is ignored entirely
    #[default]
    Unlimited,
    /// Consumption is accounted in [`EnergyLedger::consumed`] but the level
    /// never changes
    Observed,
    /// Consumption depletes the level; an empty node turns its radio off
    Constrained,
}

/// Energy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyConfig {
    /// Starting energy
    pub initial: InitialEnergy,
    /// Energy spent per scan; required unless the mode is `Unlimited`
    pub scan_energy: Option<f64>,
    /// Energy spent per second of sending or receiving; required unless the
    /// mode is `Unlimited`
    pub transmit_energy: Option<f64>,
    /// Seconds between scans
    pub scan_interval: f64,
    /// Simulated time before which no charge applies
    pub warmup: SimTime,
    /// Whether energy is spent at all
    pub mode: EnergyMode,
    /// Only nodes in this identity group are charged
    pub charged_group: Option<char>,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            initial: InitialEnergy::Fixed(0.0),
            scan_energy: None,
            transmit_energy: None,
            scan_interval: 0.0,
            warmup: SimTime::ZERO,
            mode: EnergyMode::Unlimited,
            charged_group: None,
        }
    }
}

impl EnergyConfig {
    /// A depleting configuration with the given costs
    pub fn constrained(initial: InitialEnergy, scan_energy: f64, transmit_energy: f64, scan_interval: f64) -> Self {
        Self {
            initial,
            scan_energy: Some(scan_energy),
            transmit_energy: Some(transmit_energy),
            scan_interval,
            mode: EnergyMode::Constrained,
            ..Default::default()
        }
    }

    /// Reject missing or invalid settings
    pub fn check(&self) -> Result<(), ConfigError> {
        self.initial.check()?;
        non_negative("scan_interval", self.scan_interval)?;

        if self.mode == EnergyMode::Unlimited {
            return Ok(());
        }

        let scan = self.scan_energy.ok_or(ConfigError::Missing("scan_energy"))?;
        non_negative("scan_energy", scan)?;
        let transmit = self
            .transmit_energy
            .ok_or(ConfigError::Missing("transmit_energy"))?;
        non_negative("transmit_energy", transmit)
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

/// Transfer activity observed by the host this tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferActivity {
    /// At least one outbound transfer is active
    pub sending: bool,
    /// At least one inbound transfer is active
    pub receiving: bool,
}

/// Per-node energy ledger
pub struct EnergyLedger<I: PeerIdentity> {
    /// Node this ledger belongs to
    node: I,
    /// Configuration
    config: EnergyConfig,
    /// Current level, never negative
    level: f64,
    /// Total energy charged since construction
    consumed: f64,
    /// Last time transfer energy was charged
    last_update: SimTime,
    /// Last time scan energy was charged
    last_scan: SimTime,
    /// Energy-state change notifications
    events: broadcast::Sender<EnergyEvent<I>>,
}

impl<I: PeerIdentity> EnergyLedger<I> {
    /// Create a ledger, sampling the starting level from `rng` when the
    /// configuration gives a range
    ///
    /// Pass the same generator to every node of a run so that a batch of
    /// nodes built in sequence gets a reproducible spread of levels.
    pub fn new<R: Rng + ?Sized>(node: I, config: EnergyConfig, rng: &mut R) -> Result<Self, ConfigError> {
        config.check()?;
        let level = config.initial.sample(rng);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        debug!(node = %node, level, mode = ?config.mode, "Energy ledger initialized");

        Ok(Self {
            node,
            config,
            level,
            consumed: 0.0,
            last_update: SimTime::ZERO,
            last_scan: SimTime::ZERO,
            events,
        })
    }

    /// Fresh ledger for a replicated node: same configuration, independently
    /// re-sampled level
    pub fn replicate<R: Rng + ?Sized>(&self, node: I, rng: &mut R) -> Self {
        let level = self.config.initial.sample(rng);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            node,
            config: self.config.clone(),
            level,
            consumed: 0.0,
            last_update: self.last_update,
            last_scan: self.last_scan,
            events,
        }
    }

    /// Current energy level
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Total energy charged so far
    pub fn consumed(&self) -> f64 {
        self.consumed
    }

    /// Whether the ledger is depleting
    pub fn is_constrained(&self) -> bool {
        self.config.mode == EnergyMode::Constrained
    }

    /// Whether the node is constrained and out of energy
    pub fn is_depleted(&self) -> bool {
        self.is_constrained() && self.level <= 0.0
    }

    /// Get the configuration
    pub fn config(&self) -> &EnergyConfig {
        &self.config
    }

    /// Subscribe to energy-state changes
    pub fn subscribe(&self) -> broadcast::Receiver<EnergyEvent<I>> {
        self.events.subscribe()
    }

    fn is_charged_node(&self) -> bool {
        match self.config.charged_group {
            Some(group) => self.node.group() == Some(group),
            None => true,
        }
    }

    /// Charge `amount` for `cause`
    ///
    /// Does nothing before the warmup time or when energy is unlimited.
    /// Returns the amount actually removed from the level.
    pub fn charge(&mut self, cause: EnergyCause, amount: f64, now: SimTime) -> f64 {
        if now < self.config.warmup || !(amount.is_finite() && amount > 0.0) {
            return 0.0;
        }

        match self.config.mode {
            EnergyMode::Unlimited => 0.0,
            EnergyMode::Observed => {
                self.consumed += amount;
                0.0
            }
            EnergyMode::Constrained => {
                let before = self.level;
                self.level = (self.level - amount).max(0.0);
                self.consumed += amount;
                if self.level != before {
                    self.publish(cause, now);
                }

                if before > 0.0 && self.level <= 0.0 {
                    info!(node = %self.node, cause = %cause, at = %now, "Energy exhausted");
                }
                before - self.level
            }
        }
    }

    /// Force the level to zero because the node is listed as failed
    ///
    /// Applies regardless of warmup and mode.
    pub fn force_depleted(&mut self, now: SimTime) {
        if self.level == 0.0 {
            return;
        }
        self.level = 0.0;
        self.publish(EnergyCause::Failure, now);
    }

    /// Apply this tick's transmit, receive, and scan charges
    pub fn tick(&mut self, activity: TransferActivity, now: SimTime) {
        if self.config.mode == EnergyMode::Unlimited {
            return;
        }

        let charged = self.is_charged_node();
        let unit = self.config.transmit_energy.unwrap_or(0.0);
        let elapsed = now.since(self.last_update);

        if charged && elapsed > 0.0 && activity.sending {
            self.charge(EnergyCause::Transmit, elapsed * unit, now);
        }
        if charged && elapsed > 0.0 && activity.receiving {
            self.charge(EnergyCause::Receive, elapsed * unit, now);
        }
        self.last_update = now;

        if charged && now > self.last_scan + self.config.scan_interval {
            let scan = self.config.scan_energy.unwrap_or(0.0);
            self.charge(EnergyCause::Scan, scan, now);
            self.last_scan = now;
        }
    }

    fn publish(&self, cause: EnergyCause, now: SimTime) {
        let _ = self.events.send(EnergyEvent {
            node: self.node.clone(),
            level: self.level,
            cause,
            at: now,
        });
    }
}

impl<I: PeerIdentity> std::fmt::Debug for EnergyLedger<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnergyLedger")
            .field("node", &self.node)
            .field("level", &self.level)
            .field("consumed", &self.consumed)
            .field("mode", &self.config.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encounter_core::NodeId;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn t(secs: f64) -> SimTime {
        SimTime::from_secs(secs)
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    fn constrained(level: f64) -> EnergyConfig {
        EnergyConfig::constrained(InitialEnergy::Fixed(level), 0.1, 0.08, 30.0)
    }

    fn ledger(config: EnergyConfig) -> EnergyLedger<NodeId> {
        EnergyLedger::new(NodeId::node(1), config, &mut rng()).unwrap()
    }

    #[test]
    fn test_fixed_initial_energy() {
        let ledger = ledger(constrained(100.0));
        assert_eq!(ledger.level(), 100.0);
        assert!(!ledger.is_depleted());
    }

    #[test]
    fn test_uniform_initial_energy_within_range() {
        let config = EnergyConfig::constrained(
            InitialEnergy::from_values(&[50.0, 80.0]).unwrap(),
            0.1,
            0.08,
            30.0,
        );
        let mut shared = rng();
        let levels: Vec<f64> = (0..20)
            .map(|i| {
                EnergyLedger::new(NodeId::node(i), config.clone(), &mut shared)
                    .unwrap()
                    .level()
            })
            .collect();

        assert!(levels.iter().all(|l| (50.0..=80.0).contains(l)));
        // One shared generator spreads the batch instead of repeating a value
        assert!(levels.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_same_seed_reproduces_batch() {
        let config = EnergyConfig::constrained(
            InitialEnergy::Uniform { min: 0.0, max: 10.0 },
            0.1,
            0.08,
            30.0,
        );
        let build = || {
            let mut shared = rng();
            (0..5)
                .map(|i| {
                    EnergyLedger::new(NodeId::node(i), config.clone(), &mut shared)
                        .unwrap()
                        .level()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_initial_energy_arity() {
        assert!(matches!(
            InitialEnergy::from_values(&[]),
            Err(ConfigError::EnergyArity(0))
        ));
        assert!(matches!(
            InitialEnergy::from_values(&[1.0, 2.0, 3.0]),
            Err(ConfigError::EnergyArity(3))
        ));
        assert!(matches!(
            InitialEnergy::from_values(&[9.0, 1.0]),
            Err(ConfigError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_missing_costs_rejected() {
        let config = EnergyConfig {
            mode: EnergyMode::Constrained,
            transmit_energy: Some(0.1),
            ..Default::default()
        };
        let err = EnergyLedger::new(NodeId::node(1), config, &mut rng()).unwrap_err();
        assert_eq!(err, ConfigError::Missing("scan_energy"));

        let config = EnergyConfig {
            scan_energy: Some(f64::NAN),
            ..constrained(10.0)
        };
        assert!(EnergyLedger::new(NodeId::node(1), config, &mut rng()).is_err());
    }

    #[test]
    fn test_unlimited_needs_no_costs() {
        let ledger = ledger(EnergyConfig::default());
        assert!(!ledger.is_constrained());
    }

    #[test]
    fn test_charge_floors_at_zero() {
        let mut ledger = ledger(constrained(1.0));

        assert_eq!(ledger.charge(EnergyCause::Scan, 0.4, t(1.0)), 0.4);
        assert!((ledger.level() - 0.6).abs() < 1e-12);

        let removed = ledger.charge(EnergyCause::Transmit, 5.0, t(2.0));
        assert!((removed - 0.6).abs() < 1e-12);
        assert_eq!(ledger.level(), 0.0);
        assert!(ledger.is_depleted());

        // Still accepts charges at the floor
        assert_eq!(ledger.charge(EnergyCause::Scan, 1.0, t(3.0)), 0.0);
        assert_eq!(ledger.level(), 0.0);
    }

    #[test]
    fn test_never_negative_over_many_charges() {
        let mut ledger = ledger(constrained(3.0));
        for i in 0..100 {
            ledger.charge(EnergyCause::Receive, 0.37 * (i % 5) as f64, t(i as f64));
            assert!(ledger.level() >= 0.0);
        }
    }

    #[test]
    fn test_warmup_ignores_charges() {
        let config = EnergyConfig {
            warmup: t(100.0),
            ..constrained(10.0)
        };
        let mut ledger = ledger(config);

        ledger.charge(EnergyCause::Scan, 5.0, t(99.9));
        assert_eq!(ledger.level(), 10.0);

        ledger.charge(EnergyCause::Scan, 5.0, t(100.0));
        assert_eq!(ledger.level(), 5.0);
    }

    #[test]
    fn test_nan_charge_ignored() {
        let mut ledger = ledger(constrained(10.0));
        ledger.charge(EnergyCause::Scan, f64::NAN, t(1.0));
        assert_eq!(ledger.level(), 10.0);
    }

    #[test]
    fn test_observed_mode_accounts_without_depleting() {
        let config = EnergyConfig {
            mode: EnergyMode::Observed,
            ..constrained(10.0)
        };
        let mut ledger = ledger(config);
        let mut events = ledger.subscribe();

        ledger.charge(EnergyCause::Scan, 4.0, t(1.0));
        assert_eq!(ledger.level(), 10.0);
        assert_eq!(ledger.consumed(), 4.0);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_tick_charges_transmit_and_receive() {
        let mut ledger = ledger(constrained(100.0));

        // First tick at t=10 while sending and receiving: 2 * 10 * 0.08
        ledger.tick(
            TransferActivity {
                sending: true,
                receiving: true,
            },
            t(10.0),
        );
        assert!((ledger.level() - 98.4).abs() < 1e-9);

        // Idle tick moves the bookkeeping without charging
        ledger.tick(TransferActivity::default(), t(20.0));
        assert!((ledger.level() - 98.4).abs() < 1e-9);

        // Sending only, for the 5 seconds since the previous tick
        ledger.tick(
            TransferActivity {
                sending: true,
                receiving: false,
            },
            t(25.0),
        );
        assert!((ledger.level() - 98.0).abs() < 1e-9);
    }

    #[test]
    fn test_scan_cadence() {
        let mut ledger = ledger(constrained(10.0));

        ledger.tick(TransferActivity::default(), t(30.0));
        assert_eq!(ledger.level(), 10.0);

        ledger.tick(TransferActivity::default(), t(30.5));
        assert!((ledger.level() - 9.9).abs() < 1e-9);

        ledger.tick(TransferActivity::default(), t(45.0));
        assert!((ledger.level() - 9.9).abs() < 1e-9);

        ledger.tick(TransferActivity::default(), t(61.0));
        assert!((ledger.level() - 9.8).abs() < 1e-9);
    }

    #[test]
    fn test_charged_group_filter() {
        let config = EnergyConfig {
            charged_group: Some('n'),
            ..constrained(10.0)
        };
        let mut infrastructure =
            EnergyLedger::new(NodeId::new('c', 1), config.clone(), &mut rng()).unwrap();
        let mut survivor = EnergyLedger::new(NodeId::new('n', 1), config, &mut rng()).unwrap();

        infrastructure.tick(TransferActivity::default(), t(31.0));
        survivor.tick(TransferActivity::default(), t(31.0));

        assert_eq!(infrastructure.level(), 10.0);
        assert!(survivor.level() < 10.0);
    }

    #[test]
    fn test_changes_are_broadcast() {
        let mut ledger = ledger(constrained(1.0));
        let mut events = ledger.subscribe();

        ledger.charge(EnergyCause::Scan, 0.25, t(5.0));
        let event = events.try_recv().unwrap();
        assert_eq!(event.node, NodeId::node(1));
        assert_eq!(event.level, 0.75);
        assert_eq!(event.cause, EnergyCause::Scan);
        assert_eq!(event.at, t(5.0));

        // Warmup-free no-op charges are not mutations and publish nothing
        ledger.charge(EnergyCause::Scan, 0.0, t(6.0));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_charge_at_zero_publishes_nothing() {
        let mut ledger = ledger(constrained(1.0));
        let mut events = ledger.subscribe();

        assert_eq!(ledger.charge(EnergyCause::Transmit, 5.0, t(1.0)), 1.0);
        assert!(events.try_recv().unwrap().is_depleted());

        // The ledger still accepts charges at zero, but the level is unchanged
        assert_eq!(ledger.charge(EnergyCause::Scan, 1.0, t(2.0)), 0.0);
        assert_eq!(ledger.level(), 0.0);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_force_depleted() {
        let mut ledger = ledger(constrained(5.0));
        let mut events = ledger.subscribe();

        ledger.force_depleted(t(1.0));
        assert_eq!(ledger.level(), 0.0);
        let event = events.try_recv().unwrap();
        assert_eq!(event.cause, EnergyCause::Failure);
        assert!(event.is_depleted());

        // Already at zero: nothing to publish
        ledger.force_depleted(t(2.0));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_replicate_resamples() {
        let config = EnergyConfig::constrained(
            InitialEnergy::Uniform { min: 0.0, max: 1000.0 },
            0.1,
            0.08,
            30.0,
        );
        let mut shared = rng();
        let mut original = EnergyLedger::new(NodeId::node(1), config, &mut shared).unwrap();
        original.charge(EnergyCause::Scan, 1.0, t(1.0));

        let copy = original.replicate(NodeId::node(2), &mut shared);
        assert_eq!(copy.consumed(), 0.0);
        assert_eq!(copy.config(), original.config());
        assert!((0.0..=1000.0).contains(&copy.level()));
    }
}
