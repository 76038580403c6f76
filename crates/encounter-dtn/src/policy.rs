//! Routing policies
//!
//! A [`RoutingPolicy`] supplies the variant-specific parts of a tick: which
//! (message, contact) pairs are worth trying and in what order, plus the
//! bookkeeping hooks for message creation, receipt, and transfer completion.
//! The [`TransferScheduler`](crate::scheduler::TransferScheduler) handles
//! everything the variants share.
//!
//! ## Variants
//!
//! - [`EpidemicPolicy`]: every buffered message to every gated contact
//! - [`ProphetPolicy`]: only to peers with a strictly higher delivery
//!   predictability for the destination, best peer first
//! - [`SprayAndWaitPolicy`]: only messages with copies left to hand out

use serde::{Deserialize, Serialize};
use tracing::trace;

use encounter_core::{ConfigError, PeerIdentity, SimTime};

use crate::gate::ConnectivityGate;
use crate::host::{OpenContact, PeerView, TransferHost};
use crate::message::Message;
use crate::prophet::{ProphetConfig, ProphetState};
use crate::spray::{ReplicationLedger, SprayConfig};

/// A message paired with the contact it should be offered on
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<I: PeerIdentity> {
    /// Message to send
    pub message: Message<I>,
    /// Contact to send it on
    pub contact: OpenContact<I>,
}

impl<I: PeerIdentity> Candidate<I> {
    /// Pair a message with a contact
    pub fn new(message: Message<I>, contact: OpenContact<I>) -> Self {
        Self { message, contact }
    }
}

/// Variant-specific routing behavior
pub trait RoutingPolicy<I: PeerIdentity> {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Whether `contact` may carry dissemination traffic this tick
    fn gate(&self, gate: &ConnectivityGate<I>, contact: &OpenContact<I>) -> bool {
        gate.may_transfer(&contact.peer)
    }

    /// Order the pairs to try, best first
    ///
    /// `contacts` has already been gated.
    fn rank<H: TransferHost<I>>(
        &mut self,
        host: &H,
        contacts: &[OpenContact<I>],
        now: SimTime,
    ) -> Vec<Candidate<I>>;

    /// A message was created at this node
    fn on_create(&mut self, _message: &mut Message<I>) {}

    /// A copy of a message arrived from a peer
    fn on_receive(&mut self, _message: &mut Message<I>) {}

    /// A transfer this node started finished; `buffered` is the sender's own
    /// copy if it is still in the buffer
    fn on_transfer_complete(&mut self, _buffered: Option<&mut Message<I>>) {}

    /// A contact with `peer` came up
    fn on_contact_up(&mut self, _peer: &I, _view: Option<&dyn PeerView<I>>, _now: SimTime) {}

    /// Fresh policy with the same configuration for a replicated node
    fn replicate(&self, node: I) -> Self
    where
        Self: Sized;

    /// Delivery-predictability model, for policies that keep one
    fn predictability(&self) -> Option<&ProphetState<I>> {
        None
    }

    /// Diagnostic dump, for policies that have one
    fn report(&mut self, _now: SimTime) -> Option<String> {
        None
    }
}

/// Every buffered message, in queue order, on every gated contact
fn flood<I: PeerIdentity, H: TransferHost<I>>(
    host: &H,
    mut messages: Vec<Message<I>>,
    contacts: &[OpenContact<I>],
) -> Vec<Candidate<I>> {
    messages.sort_by(|a, b| host.queue_order(a, b));

    let mut candidates = Vec::new();
    for contact in contacts {
        let view = host.peer(&contact.peer);
        for message in &messages {
            if view.is_some_and(|peer| peer.has_message(message.id)) {
                continue;
            }
            candidates.push(Candidate::new(message.clone(), contact.clone()));
        }
    }
    candidates
}

/// Plain epidemic replication
#[derive(Debug, Clone, Copy, Default)]
pub struct EpidemicPolicy;

impl<I: PeerIdentity> RoutingPolicy<I> for EpidemicPolicy {
    fn name(&self) -> &'static str {
        "epidemic"
    }

    fn rank<H: TransferHost<I>>(
        &mut self,
        host: &H,
        contacts: &[OpenContact<I>],
        _now: SimTime,
    ) -> Vec<Candidate<I>> {
        flood(host, host.buffered(), contacts)
    }

    fn replicate(&self, _node: I) -> Self {
        EpidemicPolicy
    }
}

/// Predictability-ranked forwarding (PRoPHET, GRTRMax ordering)
#[derive(Debug, Clone)]
pub struct ProphetPolicy<I: PeerIdentity> {
    state: ProphetState<I>,
}

impl<I: PeerIdentity> ProphetPolicy<I> {
    /// Create a policy for `node`
    pub fn new(node: I, config: ProphetConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            state: ProphetState::new(node, config)?,
        })
    }

    /// Get the predictability model
    pub fn state(&self) -> &ProphetState<I> {
        &self.state
    }

    /// Get the predictability model mutably
    pub fn state_mut(&mut self) -> &mut ProphetState<I> {
        &mut self.state
    }
}

impl<I: PeerIdentity> RoutingPolicy<I> for ProphetPolicy<I> {
    fn name(&self) -> &'static str {
        "prophet"
    }

    fn rank<H: TransferHost<I>>(
        &mut self,
        host: &H,
        contacts: &[OpenContact<I>],
        now: SimTime,
    ) -> Vec<Candidate<I>> {
        let messages = host.buffered();
        let mut scored: Vec<(f64, Candidate<I>)> = Vec::new();

        for contact in contacts {
            let Some(peer) = host.peer(&contact.peer) else {
                continue;
            };
            if peer.is_transferring() {
                continue;
            }
            let Some(theirs) = peer.predictability() else {
                continue;
            };

            for message in &messages {
                if peer.has_message(message.id) {
                    continue;
                }
                let peer_p = theirs.peek_at(&message.to, now);
                let own_p = self.state.predictability_for(&message.to, now);
                if peer_p > own_p {
                    scored.push((peer_p, Candidate::new(message.clone(), contact.clone())));
                }
            }
        }

        scored.sort_by(|(pa, a), (pb, b)| {
            pb.total_cmp(pa)
                .then_with(|| host.queue_order(&a.message, &b.message))
        });

        trace!(candidates = scored.len(), "Ranked by peer predictability");
        scored.into_iter().map(|(_, candidate)| candidate).collect()
    }

    fn on_contact_up(&mut self, peer: &I, view: Option<&dyn PeerView<I>>, now: SimTime) {
        let theirs = view.and_then(|v| v.predictability());
        self.state.on_contact_up(peer, theirs, now);
    }

    fn replicate(&self, node: I) -> Self {
        Self {
            state: self.state.replicate(node),
        }
    }

    fn predictability(&self) -> Option<&ProphetState<I>> {
        Some(&self.state)
    }

    fn report(&mut self, now: SimTime) -> Option<String> {
        Some(self.state.report(now).to_string())
    }
}

/// Spray-and-wait controlled replication
#[derive(Debug, Clone)]
pub struct SprayAndWaitPolicy {
    ledger: ReplicationLedger,
}

impl SprayAndWaitPolicy {
    /// Create a policy, rejecting a zero copy budget
    pub fn new(config: SprayConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            ledger: ReplicationLedger::new(config)?,
        })
    }

    /// Get the replica ledger
    pub fn ledger(&self) -> &ReplicationLedger {
        &self.ledger
    }
}

impl<I: PeerIdentity> RoutingPolicy<I> for SprayAndWaitPolicy {
    fn name(&self) -> &'static str {
        "spray-and-wait"
    }

    fn rank<H: TransferHost<I>>(
        &mut self,
        host: &H,
        contacts: &[OpenContact<I>],
        _now: SimTime,
    ) -> Vec<Candidate<I>> {
        let sprayable = host
            .buffered()
            .into_iter()
            .filter(|message| self.ledger.eligible_for_spray(message))
            .collect();
        flood(host, sprayable, contacts)
    }

    fn on_create(&mut self, message: &mut Message<I>) {
        self.ledger.on_create(message);
    }

    fn on_receive(&mut self, message: &mut Message<I>) {
        self.ledger.on_receive(message);
    }

    fn on_transfer_complete(&mut self, buffered: Option<&mut Message<I>>) {
        self.ledger.on_transfer_completed(buffered);
    }

    fn replicate(&self, _node: I) -> Self {
        self.clone()
    }
}

/// Which routing variant a node runs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum PolicyKind {
    /// Plain epidemic replication
    #[default]
    Epidemic,
    /// Predictability-ranked forwarding
    Prophet(ProphetConfig),
    /// Spray-and-wait
    SprayAndWait(SprayConfig),
}

impl PolicyKind {
    /// Build the policy for `node`
    pub fn build<I: PeerIdentity>(&self, node: I) -> Result<AnyPolicy<I>, ConfigError> {
        Ok(match self {
            PolicyKind::Epidemic => AnyPolicy::Epidemic(EpidemicPolicy),
            PolicyKind::Prophet(config) => AnyPolicy::Prophet(ProphetPolicy::new(node, config.clone())?),
            PolicyKind::SprayAndWait(config) => AnyPolicy::SprayAndWait(SprayAndWaitPolicy::new(*config)?),
        })
    }
}

/// A policy chosen at runtime
#[derive(Debug, Clone)]
pub enum AnyPolicy<I: PeerIdentity> {
    Epidemic(EpidemicPolicy),
    Prophet(ProphetPolicy<I>),
    SprayAndWait(SprayAndWaitPolicy),
}

macro_rules! dispatch {
    ($self:expr, $policy:ident => $body:expr) => {
        match $self {
            AnyPolicy::Epidemic($policy) => $body,
            AnyPolicy::Prophet($policy) => $body,
            AnyPolicy::SprayAndWait($policy) => $body,
        }
    };
}

impl<I: PeerIdentity> RoutingPolicy<I> for AnyPolicy<I> {
    fn name(&self) -> &'static str {
        dispatch!(self, p => RoutingPolicy::<I>::name(p))
    }

    fn gate(&self, gate: &ConnectivityGate<I>, contact: &OpenContact<I>) -> bool {
        dispatch!(self, p => p.gate(gate, contact))
    }

    fn rank<H: TransferHost<I>>(
        &mut self,
        host: &H,
        contacts: &[OpenContact<I>],
        now: SimTime,
    ) -> Vec<Candidate<I>> {
        dispatch!(self, p => p.rank(host, contacts, now))
    }

    fn on_create(&mut self, message: &mut Message<I>) {
        dispatch!(self, p => p.on_create(message))
    }

    fn on_receive(&mut self, message: &mut Message<I>) {
        dispatch!(self, p => p.on_receive(message))
    }

    fn on_transfer_complete(&mut self, buffered: Option<&mut Message<I>>) {
        dispatch!(self, p => p.on_transfer_complete(buffered))
    }

    fn on_contact_up(&mut self, peer: &I, view: Option<&dyn PeerView<I>>, now: SimTime) {
        dispatch!(self, p => p.on_contact_up(peer, view, now))
    }

    fn replicate(&self, node: I) -> Self {
        match self {
            AnyPolicy::Epidemic(p) => AnyPolicy::Epidemic(RoutingPolicy::<I>::replicate(p, node)),
            AnyPolicy::Prophet(p) => AnyPolicy::Prophet(p.replicate(node)),
            AnyPolicy::SprayAndWait(p) => AnyPolicy::SprayAndWait(RoutingPolicy::<I>::replicate(p, node)),
        }
    }

    fn predictability(&self) -> Option<&ProphetState<I>> {
        dispatch!(self, p => RoutingPolicy::<I>::predictability(p))
    }

    fn report(&mut self, now: SimTime) -> Option<String> {
        dispatch!(self, p => RoutingPolicy::<I>::report(p, now))
    }
}
