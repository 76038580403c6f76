//! Spray-and-wait replica accounting
//!
//! Every message created under this protocol carries a replica count. A node
//! holding `n > 1` copies may hand some of them to a peer (the *spray*
//! phase); a node holding exactly one copy only waits to meet the
//! destination.
//!
//! Two split rules are supported:
//!
//! - **Standard**: the receiver always gets one copy and the sender keeps
//!   `n - 1`
//! - **Binary**: the receiver gets `ceil(n/2)` and the sender keeps
//!   `floor(n/2)`
//!
//! A message without a replica count reaching any of these operations was
//! created outside the protocol. That is a contract violation and panics.

use serde::{Deserialize, Serialize};
use tracing::trace;

use encounter_core::{ConfigError, PeerIdentity};

use crate::message::Message;

/// Copy-split rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SprayMode {
    /// Hand out one copy per transfer
    #[default]
    Standard,
    /// Hand out half of the remaining copies per transfer
    Binary,
}

/// Spray-and-wait configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprayConfig {
    /// Replica count attached to a newly created message
    pub initial_copies: u32,
    /// Copy-split rule
    pub mode: SprayMode,
}

impl Default for SprayConfig {
    fn default() -> Self {
        Self {
            initial_copies: 6,
            mode: SprayMode::Standard,
        }
    }
}

impl SprayConfig {
    /// Binary spray-and-wait with the given copy budget
    pub fn binary(initial_copies: u32) -> Self {
        Self {
            initial_copies,
            mode: SprayMode::Binary,
        }
    }

    /// Reject a zero copy budget
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.initial_copies == 0 {
            return Err(ConfigError::NoCopies);
        }
        Ok(())
    }
}

/// Replica-count bookkeeping for one node
#[derive(Debug, Clone)]
pub struct ReplicationLedger {
    config: SprayConfig,
}

impl ReplicationLedger {
    /// Create a ledger, rejecting a zero copy budget
    pub fn new(config: SprayConfig) -> Result<Self, ConfigError> {
        config.check()?;
        Ok(Self { config })
    }

    /// Get the configuration
    pub fn config(&self) -> &SprayConfig {
        &self.config
    }

    /// Attach the initial replica count to a message created at this node
    pub fn on_create<I: PeerIdentity>(&self, message: &mut Message<I>) {
        message.set_copies(self.config.initial_copies);
    }

    /// Rewrite the replica count of a copy just received from a peer
    ///
    /// `message` still carries the count the sender held when it started the
    /// transfer.
    pub fn on_receive<I: PeerIdentity>(&self, message: &mut Message<I>) {
        let n = copies_of(message);
        let received = match self.config.mode {
            SprayMode::Binary => n.div_ceil(2),
            SprayMode::Standard => 1,
        };
        trace!(message = %message.id, sender_copies = n, received, "Copy received");
        message.set_copies(received);
    }

    /// Update the sender's count after a transfer finished
    ///
    /// `buffered` is the sender's own copy, or `None` if it was evicted while
    /// the transfer was running; that case is a no-op.
    pub fn on_transfer_completed<I: PeerIdentity>(&self, buffered: Option<&mut Message<I>>) {
        let Some(message) = buffered else {
            return;
        };

        let n = copies_of(message);
        let kept = match self.config.mode {
            SprayMode::Binary => n / 2,
            SprayMode::Standard => n.saturating_sub(1),
        };
        trace!(message = %message.id, before = n, kept, "Copies handed out");
        message.set_copies(kept);
    }

    /// Whether the message still has copies to hand out
    pub fn eligible_for_spray<I: PeerIdentity>(&self, message: &Message<I>) -> bool {
        copies_of(message) > 1
    }
}

fn copies_of<I: PeerIdentity>(message: &Message<I>) -> u32 {
    match message.copies() {
        Some(n) => n,
        None => panic!(
            "message {} has no replica count; it was not created by the spray-and-wait protocol",
            message.id
        ),
    }
}
