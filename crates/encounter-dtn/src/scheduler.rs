//! Per-node transfer scheduler
//!
//! Each simulated tick the host calls [`TransferScheduler::tick`], which runs
//! a strictly ordered sequence and stops at the first step that decides the
//! tick:
//!
//! 1. refresh the gate's snapshots if due, then the admission check
//!    (radio off or failed ends the tick), then this tick's energy charges
//! 2. already transferring, or nothing can start: busy
//! 3. direct delivery to any open contact that is a message's destination
//! 4. policy-ranked dissemination over gated contacts
//! 5. otherwise idle
//!
//! Direct delivery only passes the admission check; the final hop is never
//! topology-gated.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use encounter_core::{
    ConfigError, EnergyEvent, FailureOracle, NeighborOracle, NoSchedule, PeerIdentity, SimTime,
};

use crate::energy::{EnergyConfig, EnergyLedger, TransferActivity};
use crate::gate::{Admission, ConnectivityGate, GateConfig};
use crate::host::{OpenContact, PeerView, TransferHost};
use crate::message::{Message, MessageId};
use crate::policy::RoutingPolicy;
use crate::prophet::ProphetState;

/// How a tick ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing worth sending
    Idle,
    /// Out of energy
    RadioOff,
    /// Listed as failed
    Failed,
    /// Already transferring or unable to start a transfer
    Busy,
    /// Started delivering a message to its destination
    Delivering(MessageId),
    /// Started forwarding a message to an intermediate node
    Forwarding(MessageId),
}

impl TickOutcome {
    /// Whether a transfer started this tick
    pub fn started(&self) -> bool {
        matches!(self, TickOutcome::Delivering(_) | TickOutcome::Forwarding(_))
    }
}

/// Shared schedule oracles consulted by every node's gate
#[derive(Clone)]
pub struct Oracles<I: PeerIdentity> {
    /// Scheduled-neighbor lookup
    pub neighbors: Arc<dyn NeighborOracle<I>>,
    /// Failed-node lookup
    pub failures: Arc<dyn FailureOracle<I>>,
}

impl<I: PeerIdentity> Oracles<I> {
    /// Bundle two oracles
    pub fn new(neighbors: Arc<dyn NeighborOracle<I>>, failures: Arc<dyn FailureOracle<I>>) -> Self {
        Self {
            neighbors,
            failures,
        }
    }

    /// No scheduled neighbors and no failures
    pub fn none() -> Self {
        Self::new(Arc::new(NoSchedule), Arc::new(NoSchedule))
    }
}

impl<I: PeerIdentity> std::fmt::Debug for Oracles<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Oracles").finish_non_exhaustive()
    }
}

/// Routing decision engine for one node
#[derive(Debug)]
pub struct TransferScheduler<I: PeerIdentity, P: RoutingPolicy<I>> {
    node: I,
    policy: P,
    gate: ConnectivityGate<I>,
    energy: EnergyLedger<I>,
    oracles: Oracles<I>,
}

impl<I: PeerIdentity, P: RoutingPolicy<I>> TransferScheduler<I, P> {
    /// Create a scheduler for `node`
    ///
    /// `rng` samples the starting energy level; pass the run's shared
    /// generator.
    pub fn new<R: Rng + ?Sized>(
        node: I,
        policy: P,
        gate: GateConfig,
        energy: EnergyConfig,
        oracles: Oracles<I>,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        let gate = ConnectivityGate::new(node.clone(), gate)?;
        let energy = EnergyLedger::new(node.clone(), energy, rng)?;

        debug!(node = %node, policy = policy.name(), "Scheduler created");

        Ok(Self {
            node,
            policy,
            gate,
            energy,
            oracles,
        })
    }

    /// Fresh scheduler for a new node with the same configuration
    ///
    /// Nothing mutable is shared with `self`; the energy level is re-sampled.
    pub fn replicate<R: Rng + ?Sized>(&self, node: I, rng: &mut R) -> Self {
        Self {
            policy: self.policy.replicate(node.clone()),
            gate: self.gate.replicate(node.clone()),
            energy: self.energy.replicate(node.clone(), rng),
            oracles: self.oracles.clone(),
            node,
        }
    }

    /// This node's identity
    pub fn node(&self) -> &I {
        &self.node
    }

    /// Get the routing policy
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Get the routing policy mutably
    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    /// Get the connectivity gate
    pub fn gate(&self) -> &ConnectivityGate<I> {
        &self.gate
    }

    /// Get the energy ledger
    pub fn energy(&self) -> &EnergyLedger<I> {
        &self.energy
    }

    /// Subscribe to this node's energy-state changes
    pub fn subscribe_energy(&self) -> broadcast::Receiver<EnergyEvent<I>> {
        self.energy.subscribe()
    }

    /// This node's delivery-predictability model, if its policy keeps one
    pub fn predictability(&self) -> Option<&ProphetState<I>> {
        self.policy.predictability()
    }

    /// Diagnostic dump from the policy
    pub fn report(&mut self, now: SimTime) -> Option<String> {
        self.policy.report(now)
    }

    /// A message was created at this node
    pub fn on_message_created(&mut self, message: &mut Message<I>) {
        self.policy.on_create(message);
    }

    /// A copy of a message arrived at this node
    pub fn on_message_received(&mut self, message: &mut Message<I>) {
        self.policy.on_receive(message);
    }

    /// A transfer this node started has finished
    pub fn on_transfer_completed(&mut self, buffered: Option<&mut Message<I>>) {
        self.policy.on_transfer_complete(buffered);
    }

    /// A contact with `peer` came up
    ///
    /// `view` is only borrowed for the duration of the call.
    pub fn on_contact_up(&mut self, peer: &I, view: Option<&dyn PeerView<I>>, now: SimTime) {
        self.policy.on_contact_up(peer, view, now);
    }

    /// Run one tick
    pub fn tick<H: TransferHost<I>>(&mut self, host: &mut H, now: SimTime) -> TickOutcome {
        self.gate
            .refresh(now, self.oracles.neighbors.as_ref(), self.oracles.failures.as_ref());

        match self.gate.admit(&mut self.energy, now) {
            Admission::RadioOff => return TickOutcome::RadioOff,
            Admission::Failed => return TickOutcome::Failed,
            Admission::Open => {}
        }

        let activity = TransferActivity {
            sending: host.is_sending(),
            receiving: host.is_receiving(),
        };
        self.energy.tick(activity, now);
        if self.energy.is_depleted() {
            return TickOutcome::RadioOff;
        }

        if host.is_transferring() || !host.can_start_transfer() {
            return TickOutcome::Busy;
        }

        let contacts = host.open_contacts();
        if contacts.is_empty() {
            return TickOutcome::Idle;
        }

        if let Some(id) = self.deliver(host, &contacts) {
            return TickOutcome::Delivering(id);
        }

        let gated: Vec<OpenContact<I>> = contacts
            .into_iter()
            .filter(|contact| self.policy.gate(&self.gate, contact))
            .collect();
        if gated.is_empty() {
            trace!(node = %self.node, "No gated contacts");
            return TickOutcome::Idle;
        }

        let candidates = self.policy.rank(&*host, &gated, now);
        for candidate in candidates {
            if host.start_transfer(&candidate.message, &candidate.contact).is_started() {
                debug!(
                    node = %self.node,
                    peer = %candidate.contact.peer,
                    message = %candidate.message.id,
                    policy = self.policy.name(),
                    "Forwarding"
                );
                return TickOutcome::Forwarding(candidate.message.id);
            }
        }

        TickOutcome::Idle
    }

    /// Offer every message addressed to a connected peer, in queue order
    fn deliver<H: TransferHost<I>>(&self, host: &mut H, contacts: &[OpenContact<I>]) -> Option<MessageId> {
        let mut messages = host.buffered();
        messages.sort_by(|a, b| host.queue_order(a, b));

        for contact in contacts {
            for message in messages.iter().filter(|m| m.is_for(&contact.peer)) {
                if host.start_transfer(message, contact).is_started() {
                    debug!(node = %self.node, peer = %contact.peer, message = %message.id, "Delivering");
                    return Some(message.id);
                }
            }
        }
        None
    }
}
