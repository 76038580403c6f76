//! Node events

use serde::{Deserialize, Serialize};

use crate::identity::PeerIdentity;
use crate::time::SimTime;

/// What changed a node's energy level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnergyCause {
    /// Energy spent while at least one outbound transfer was active
    Transmit,
    /// Energy spent while receiving
    Receive,
    /// Fixed cost of one neighbor scan
    Scan,
    /// Node listed as failed; energy forced to zero
    Failure,
}

impl std::fmt::Display for EnergyCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnergyCause::Transmit => write!(f, "transmit"),
            EnergyCause::Receive => write!(f, "receive"),
            EnergyCause::Scan => write!(f, "scan"),
            EnergyCause::Failure => write!(f, "failure"),
        }
    }
}

/// Energy-state change notification
///
/// Emitted exactly once per ledger mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct EnergyEvent<I: PeerIdentity> {
    /// Node whose ledger changed
    pub node: I,
    /// New energy level
    pub level: f64,
    /// Cause of the change
    pub cause: EnergyCause,
    /// When the change was applied
    pub at: SimTime,
}

impl<I: PeerIdentity> EnergyEvent<I> {
    /// Whether this change left the node without energy
    pub fn is_depleted(&self) -> bool {
        self.level <= 0.0
    }
}
