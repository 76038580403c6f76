//! Simulation engine
//!
//! Implements a deterministic discrete-time world around the routing engine:
//! - Open contacts derived from the neighbor schedule, plus chance contacts
//!   the schedule does not predict
//! - One transfer per radio, completed on the tick after it starts
//! - Message generation between random node pairs
//! - Delivery, latency, and overhead accounting
//!
//! Each node's [`TransferScheduler`] decides what to send; this module only
//! plays the host role for it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, info_span, trace, warn};
use uuid::Uuid;

use encounter_core::{Clock, ConfigError, EnergyCause, EnergyEvent, ManualClock, NeighborOracle, NodeId, SimTime};
use encounter_dtn::{
    AnyPolicy, ContactId, FailureSchedule, Message, MessageId, NeighborSchedule, OpenContact, Oracles,
    PeerView, ProphetState, RouterConfig, RoutingPolicy, TickOutcome, TransferHost, TransferScheduler,
    TransferStart,
};
use encounter_logging::NodeContextGuard;

type Router = TransferScheduler<NodeId, AnyPolicy<NodeId>>;

/// Errors from setting up a simulation
#[derive(Debug, Error)]
pub enum SimError {
    #[error("router configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("need at least 2 nodes, got {0}")]
    TooFewNodes(u32),

    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("chance_contact_probability must be within [0, 1], got {0}")]
    Probability(f64),
}

/// Configuration for the simulation
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Routing engine settings, shared by every node
    pub router: RouterConfig,
    /// Number of nodes, identified `n0..n{count}`
    pub node_count: u32,
    /// Simulated seconds per tick
    pub tick_secs: f64,
    /// Simulated seconds to run
    pub duration_secs: f64,
    /// Length of a chance-contact window
    pub window_secs: f64,
    /// Probability that an unscheduled pair meets during a window
    pub chance_contact_probability: f64,
    /// Seconds between generated messages (None = only explicit sends)
    pub message_interval_secs: Option<f64>,
    /// Payload size of generated messages
    pub message_size: usize,
    /// Seed for every random choice in the run
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            node_count: 50,
            tick_secs: 1.0,
            duration_secs: 3600.0,
            window_secs: 600.0,
            chance_contact_probability: 0.0,
            message_interval_secs: Some(30.0),
            message_size: 1024,
            seed: 1,
        }
    }
}

impl SimConfig {
    /// Reject settings that cannot run
    pub fn check(&self) -> Result<(), SimError> {
        if self.node_count < 2 {
            return Err(SimError::TooFewNodes(self.node_count));
        }
        for (name, value) in [
            ("tick_secs", self.tick_secs),
            ("window_secs", self.window_secs),
            ("message_interval_secs", self.message_interval_secs.unwrap_or(1.0)),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::NotPositive { name, value });
            }
        }
        if !(0.0..=1.0).contains(&self.chance_contact_probability) {
            return Err(SimError::Probability(self.chance_contact_probability));
        }
        self.router.check()?;
        Ok(())
    }
}

/// Simulation statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimStats {
    pub messages_created: u64,
    pub messages_delivered: u64,
    pub transfers_started: u64,
    pub transfers_completed: u64,
    pub transfers_aborted: u64,
    /// Sum over delivered messages of seconds from creation to delivery
    pub total_delivery_latency: f64,
    /// Sum over delivered messages of hops travelled
    pub total_delivery_hops: u64,
    pub contacts_opened: u64,
    pub radio_off_ticks: u64,
    pub failed_ticks: u64,
    /// Nodes that ran out of energy through their own activity
    pub depletions: u64,
    /// Nodes whose energy was zeroed by a failure listing
    pub failures: u64,
}

impl SimStats {
    /// Delivered fraction of created messages
    pub fn delivery_ratio(&self) -> f64 {
        if self.messages_created == 0 {
            return 0.0;
        }
        self.messages_delivered as f64 / self.messages_created as f64
    }

    /// Mean seconds from creation to delivery
    pub fn mean_latency(&self) -> Option<f64> {
        (self.messages_delivered > 0).then(|| self.total_delivery_latency / self.messages_delivered as f64)
    }

    /// Mean hops of delivered messages
    pub fn mean_hops(&self) -> Option<f64> {
        (self.messages_delivered > 0).then(|| self.total_delivery_hops as f64 / self.messages_delivered as f64)
    }

    /// Relayed copies that did not deliver, per delivered message
    pub fn overhead_ratio(&self) -> Option<f64> {
        (self.messages_delivered > 0).then(|| {
            (self.transfers_completed as f64 - self.messages_delivered as f64) / self.messages_delivered as f64
        })
    }
}

/// End-of-run summary
#[derive(Debug, Clone, PartialEq)]
pub struct SimReport {
    /// Routing policy name
    pub policy: &'static str,
    /// Simulated seconds covered
    pub elapsed_secs: f64,
    pub stats: SimStats,
    /// Nodes neither out of energy nor listed as failed
    pub alive_nodes: usize,
    pub node_count: usize,
    /// Mean remaining energy, when energy is constrained
    pub mean_energy: Option<f64>,
}

impl std::fmt::Display for SimReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let or_dash = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v));

        writeln!(f, "policy:          {}", self.policy)?;
        writeln!(f, "simulated:       {:.0}s", self.elapsed_secs)?;
        writeln!(
            f,
            "delivered:       {}/{} ({:.1}%)",
            self.stats.messages_delivered,
            self.stats.messages_created,
            self.stats.delivery_ratio() * 100.0
        )?;
        writeln!(f, "mean latency:    {}s", or_dash(self.stats.mean_latency()))?;
        writeln!(f, "mean hops:       {}", or_dash(self.stats.mean_hops()))?;
        writeln!(f, "overhead ratio:  {}", or_dash(self.stats.overhead_ratio()))?;
        writeln!(
            f,
            "transfers:       {} started, {} completed, {} aborted",
            self.stats.transfers_started, self.stats.transfers_completed, self.stats.transfers_aborted
        )?;
        writeln!(f, "alive nodes:     {}/{}", self.alive_nodes, self.node_count)?;
        write!(f, "mean energy:     {}", or_dash(self.mean_energy))
    }
}

/// Per-node buffer and delivery record
#[derive(Debug)]
struct NodeState {
    id: NodeId,
    buffer: Vec<Message<NodeId>>,
    /// Messages this node received as their destination
    delivered: HashSet<MessageId>,
}

impl NodeState {
    fn has_message(&self, id: MessageId) -> bool {
        self.delivered.contains(&id) || self.buffer.iter().any(|m| m.id == id)
    }
}

/// A transfer started this tick, completed on the next
#[derive(Debug, Clone)]
struct Transfer {
    from: usize,
    to: usize,
    message: Message<NodeId>,
}

/// What one node sees of a peer
struct NodeView<'a> {
    state: &'a NodeState,
    model: Option<&'a ProphetState<NodeId>>,
    transferring: bool,
}

impl PeerView<NodeId> for NodeView<'_> {
    fn is_transferring(&self) -> bool {
        self.transferring
    }

    fn has_message(&self, id: MessageId) -> bool {
        self.state.has_message(id)
    }

    fn predictability(&self) -> Option<&ProphetState<NodeId>> {
        self.model
    }
}

/// Host view of one node for the duration of its tick
struct NodeHost<'a> {
    index: usize,
    state: &'a NodeState,
    lookup: &'a HashMap<NodeId, usize>,
    contacts: Vec<OpenContact<NodeId>>,
    peers: HashMap<NodeId, NodeView<'a>>,
    sending: bool,
    receiving: bool,
    started: Option<Transfer>,
}

impl TransferHost<NodeId> for NodeHost<'_> {
    fn is_sending(&self) -> bool {
        self.sending
    }

    fn is_receiving(&self) -> bool {
        self.receiving
    }

    fn can_start_transfer(&self) -> bool {
        self.started.is_none()
    }

    fn open_contacts(&self) -> Vec<OpenContact<NodeId>> {
        self.contacts.clone()
    }

    fn buffered(&self) -> Vec<Message<NodeId>> {
        self.state.buffer.clone()
    }

    fn peer(&self, peer: &NodeId) -> Option<&dyn PeerView<NodeId>> {
        self.peers.get(peer).map(|view| view as &dyn PeerView<NodeId>)
    }

    fn start_transfer(&mut self, message: &Message<NodeId>, contact: &OpenContact<NodeId>) -> TransferStart {
        if self.started.is_some() {
            return TransferStart::Busy;
        }
        let (Some(view), Some(&to)) = (self.peers.get(&contact.peer), self.lookup.get(&contact.peer)) else {
            return TransferStart::Denied;
        };
        if view.transferring {
            return TransferStart::Busy;
        }
        if view.has_message(message.id) {
            return TransferStart::Denied;
        }

        self.started = Some(Transfer {
            from: self.index,
            to,
            message: message.clone(),
        });
        TransferStart::Started
    }
}

/// Shared access to every element but one
struct Others<'a, T> {
    before: &'a [T],
    after: &'a [T],
}

impl<'a, T> Others<'a, T> {
    fn get(&self, index: usize) -> Option<&'a T> {
        let split = self.before.len();
        match index.cmp(&split) {
            std::cmp::Ordering::Less => self.before.get(index),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => self.after.get(index - split - 1),
        }
    }
}

/// Borrow `items[index]` mutably alongside the rest
fn split_around<T>(items: &mut [T], index: usize) -> Option<(&mut T, Others<'_, T>)> {
    let (before, rest) = items.split_at_mut(index);
    let (item, after) = rest.split_first_mut()?;
    Some((
        item,
        Others {
            before: &*before,
            after: &*after,
        },
    ))
}

/// The simulation state
pub struct Simulation {
    config: SimConfig,
    clock: ManualClock,
    nodes: Vec<NodeState>,
    routers: Vec<Router>,
    energy_events: Vec<broadcast::Receiver<EnergyEvent<NodeId>>>,
    instance_ids: Vec<Uuid>,
    lookup: HashMap<NodeId, usize>,
    schedule: Arc<NeighborSchedule>,
    /// Open contacts as normalized `(low, high)` index pairs
    contacts: BTreeSet<(usize, usize)>,
    /// Unscheduled pairs meeting during the current window
    chance: BTreeSet<(usize, usize)>,
    /// Nodes whose energy has reached zero
    exhausted: HashSet<NodeId>,
    chance_window: Option<u64>,
    in_flight: Vec<Transfer>,
    next_message_id: u64,
    next_message_at: f64,
    rng: ChaCha8Rng,
    /// Statistics
    pub stats: SimStats,
}

impl Simulation {
    /// Create a simulation over `schedule`, with `failures` listing disabled nodes
    ///
    /// The first node is built from the router configuration and the rest
    /// are replicated from it.
    pub fn new(
        config: SimConfig,
        schedule: Arc<NeighborSchedule>,
        failures: Arc<FailureSchedule>,
    ) -> Result<Self, SimError> {
        config.check()?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let ids = NodeId::range(config.node_count);
        let oracles = Oracles::new(schedule.clone(), failures);
        let prototype = config.router.build(ids[0], oracles, &mut rng)?;

        let mut routers = Vec::with_capacity(ids.len());
        for id in &ids[1..] {
            routers.push(prototype.replicate(*id, &mut rng));
        }
        routers.insert(0, prototype);

        let warnings = config.router.validate();
        for warning in &warnings {
            warn!(%warning, "Suspicious router configuration");
        }

        info!(
            nodes = ids.len(),
            policy = routers[0].policy().name(),
            seed = config.seed,
            "Simulation initialized"
        );

        Ok(Self {
            energy_events: routers.iter().map(Router::subscribe_energy).collect(),
            instance_ids: ids.iter().map(|_| Uuid::new_v4()).collect(),
            lookup: ids.iter().enumerate().map(|(i, id)| (*id, i)).collect(),
            nodes: ids
                .into_iter()
                .map(|id| NodeState {
                    id,
                    buffer: Vec::new(),
                    delivered: HashSet::new(),
                })
                .collect(),
            routers,
            schedule,
            contacts: BTreeSet::new(),
            chance: BTreeSet::new(),
            exhausted: HashSet::new(),
            chance_window: None,
            in_flight: Vec::new(),
            next_message_id: 0,
            next_message_at: config.message_interval_secs.unwrap_or(f64::INFINITY),
            rng,
            clock: ManualClock::new(),
            stats: SimStats::default(),
            config,
        })
    }

    /// Current simulated time
    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// The clock the simulation advances once per tick
    ///
    /// Clones observe the same time, so a caller can watch the run progress.
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Get the configuration
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Routing engine of `node`
    pub fn router(&self, node: &NodeId) -> Option<&Router> {
        self.lookup.get(node).map(|&i| &self.routers[i])
    }

    /// Whether `a` and `b` currently have an open contact
    pub fn in_contact(&self, a: &NodeId, b: &NodeId) -> bool {
        match (self.lookup.get(a), self.lookup.get(b)) {
            (Some(&a), Some(&b)) if a != b => self.contacts.contains(&normalize(a, b)),
            _ => false,
        }
    }

    /// Whether `node` has received message `id` as its destination
    pub fn was_delivered(&self, node: &NodeId, id: MessageId) -> bool {
        self.lookup
            .get(node)
            .is_some_and(|&i| self.nodes[i].delivered.contains(&id))
    }

    /// Delivery-predictability dump of `node`, if its policy keeps a model
    pub fn predictability_report(&mut self, node: &NodeId) -> Option<String> {
        let index = *self.lookup.get(node)?;
        self.routers[index].report(self.clock.now())
    }

    /// Number of messages buffered at `node`
    pub fn buffered_at(&self, node: &NodeId) -> usize {
        self.lookup.get(node).map_or(0, |&i| self.nodes[i].buffer.len())
    }

    /// Create a message at `from` addressed to `to`
    ///
    /// Returns `None` if either node is unknown or they are the same node.
    pub fn send_message(&mut self, from: &NodeId, to: &NodeId) -> Option<MessageId> {
        let (&source, &destination) = (self.lookup.get(from)?, self.lookup.get(to)?);
        (source != destination).then(|| self.create_message(source, destination))
    }

    fn create_message(&mut self, from: usize, to: usize) -> MessageId {
        let id = MessageId(self.next_message_id);
        self.next_message_id += 1;

        let mut message = Message::new(
            id,
            self.nodes[from].id,
            self.nodes[to].id,
            self.config.message_size,
            self.clock.now(),
        );
        self.routers[from].on_message_created(&mut message);
        self.nodes[from].buffer.push(message);
        self.stats.messages_created += 1;

        trace!(message = %id, from = %self.nodes[from].id, to = %self.nodes[to].id, "Message created");
        id
    }

    /// Run a single simulation tick
    pub fn step(&mut self) {
        let now = self.clock.now();
        trace!(at = %now, "=== Tick ===");

        // 1. Finish last tick's transfers
        self.complete_transfers(now);

        // 2. Open and close contacts, exchanging state on new ones
        self.refresh_contacts(now);

        // 3. Generate traffic
        self.generate_messages(now);

        // 4. Let every node decide
        for index in 0..self.routers.len() {
            self.tick_node(index, now);
        }

        // 5. Account energy transitions
        self.drain_energy_events();

        self.clock.advance(self.config.tick_secs);
    }

    /// Run for the configured duration
    pub fn run(&mut self) -> SimReport {
        let end = SimTime::from_secs(self.config.duration_secs);
        while self.clock.now() < end {
            self.step();
        }

        let report = self.report();
        info!(
            delivered = report.stats.messages_delivered,
            created = report.stats.messages_created,
            alive = report.alive_nodes,
            "Simulation complete"
        );
        report
    }

    /// Run for a specific number of ticks
    pub fn run_ticks(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Summarize the run so far
    pub fn report(&self) -> SimReport {
        let constrained = self.routers.iter().any(|r| r.energy().is_constrained());
        let mean_energy = constrained.then(|| {
            self.routers.iter().map(|r| r.energy().level()).sum::<f64>() / self.routers.len() as f64
        });

        SimReport {
            policy: self.routers[0].policy().name(),
            elapsed_secs: self.clock.now().as_secs(),
            stats: self.stats.clone(),
            alive_nodes: (0..self.routers.len()).filter(|&i| self.is_up(i)).count(),
            node_count: self.routers.len(),
            mean_energy,
        }
    }

    /// Whether the node's radio is usable
    fn is_up(&self, index: usize) -> bool {
        let router = &self.routers[index];
        !router.energy().is_depleted() && !router.gate().is_failed()
    }

    fn complete_transfers(&mut self, now: SimTime) {
        for transfer in std::mem::take(&mut self.in_flight) {
            let Transfer { from, to, message } = transfer;

            let connected = self.contacts.contains(&normalize(from, to));
            if !connected || !self.is_up(from) || !self.is_up(to) {
                debug!(message = %message.id, from = %self.nodes[from].id, to = %self.nodes[to].id, "Transfer aborted");
                self.stats.transfers_aborted += 1;
                continue;
            }

            let mut replica = message.replica(now);
            let receiver = &mut self.nodes[to];
            if replica.is_for(&receiver.id) {
                if receiver.delivered.insert(replica.id) {
                    self.stats.messages_delivered += 1;
                    self.stats.total_delivery_latency += now.since(replica.created_at);
                    self.stats.total_delivery_hops += u64::from(replica.hop_count);
                    debug!(message = %replica.id, to = %receiver.id, hops = replica.hop_count, "Delivered");
                }
            } else if !receiver.has_message(replica.id) {
                self.routers[to].on_message_received(&mut replica);
                receiver.buffer.push(replica);
            }

            let own = self.nodes[from].buffer.iter_mut().find(|m| m.id == message.id);
            self.routers[from].on_transfer_completed(own);
            self.stats.transfers_completed += 1;
        }
    }

    fn refresh_contacts(&mut self, now: SimTime) {
        let window = (now.as_secs() / self.config.window_secs).floor() as u64;
        if self.chance_window != Some(window) {
            self.roll_chance_contacts();
            self.chance_window = Some(window);
        }

        let slot = now.slot();
        let mut contacts = BTreeSet::new();
        for (index, node) in self.nodes.iter().enumerate() {
            if !self.is_up(index) {
                continue;
            }
            for peer in self.schedule.neighbors_at(&node.id, slot) {
                match self.lookup.get(&peer) {
                    Some(&other) if other != index && self.is_up(other) => {
                        contacts.insert(normalize(index, other));
                    }
                    _ => {}
                }
            }
        }
        contacts.extend(
            self.chance
                .iter()
                .filter(|&&(a, b)| self.is_up(a) && self.is_up(b)),
        );

        let opened: Vec<(usize, usize)> = contacts.difference(&self.contacts).copied().collect();
        self.contacts = contacts;

        for (a, b) in opened {
            self.stats.contacts_opened += 1;
            self.contact_up(a, b, now);
            self.contact_up(b, a, now);
        }
    }

    fn roll_chance_contacts(&mut self) {
        self.chance.clear();
        let p = self.config.chance_contact_probability;
        if p <= 0.0 {
            return;
        }

        let n = self.nodes.len();
        for a in 0..n {
            for b in (a + 1)..n {
                if self.rng.random_bool(p) {
                    self.chance.insert((a, b));
                }
            }
        }
    }

    /// Tell `index` that a contact with `peer` came up
    fn contact_up(&mut self, index: usize, peer: usize, now: SimTime) {
        let peer_id = self.nodes[peer].id;
        let transferring = self.is_transferring(peer);
        let Some((router, others)) = split_around(&mut self.routers, index) else {
            return;
        };

        let view = NodeView {
            state: &self.nodes[peer],
            model: others.get(peer).and_then(|r| r.predictability()),
            transferring,
        };
        router.on_contact_up(&peer_id, Some(&view), now);
    }

    fn is_transferring(&self, index: usize) -> bool {
        self.in_flight.iter().any(|t| t.from == index || t.to == index)
    }

    fn generate_messages(&mut self, now: SimTime) {
        let Some(interval) = self.config.message_interval_secs else {
            return;
        };

        while now.as_secs() >= self.next_message_at {
            let n = self.nodes.len();
            let from = self.rng.random_range(0..n);
            let mut to = self.rng.random_range(0..n - 1);
            if to >= from {
                to += 1;
            }
            self.create_message(from, to);
            self.next_message_at += interval;
        }
    }

    fn tick_node(&mut self, index: usize, now: SimTime) {
        let node = self.nodes[index].id;
        let _context = NodeContextGuard::with_instance_id(&node, self.instance_ids[index]);
        let span = info_span!("tick", node = %node);
        let _entered = span.enter();

        let in_flight = &self.in_flight;
        let busy = |i: usize| in_flight.iter().any(|t| t.from == i || t.to == i);

        let Some((router, others)) = split_around(&mut self.routers, index) else {
            return;
        };

        let mut contacts = Vec::new();
        let mut peers = HashMap::new();
        for &(a, b) in &self.contacts {
            let peer = match (a == index, b == index) {
                (true, _) => b,
                (_, true) => a,
                _ => continue,
            };
            let peer_id = self.nodes[peer].id;
            contacts.push(OpenContact::new(contact_id(a, b, self.nodes.len()), peer_id));
            peers.insert(
                peer_id,
                NodeView {
                    state: &self.nodes[peer],
                    model: others.get(peer).and_then(|r| r.predictability()),
                    transferring: busy(peer),
                },
            );
        }

        let mut host = NodeHost {
            index,
            state: &self.nodes[index],
            lookup: &self.lookup,
            contacts,
            peers,
            sending: in_flight.iter().any(|t| t.from == index),
            receiving: in_flight.iter().any(|t| t.to == index),
            started: None,
        };

        let outcome = router.tick(&mut host, now);
        let started = host.started.take();

        match outcome {
            TickOutcome::RadioOff => self.stats.radio_off_ticks += 1,
            TickOutcome::Failed => self.stats.failed_ticks += 1,
            _ => {}
        }
        if let Some(transfer) = started {
            trace!(message = %transfer.message.id, outcome = ?outcome, "Transfer started");
            self.stats.transfers_started += 1;
            self.in_flight.push(transfer);
        }
    }

    fn drain_energy_events(&mut self) {
        for receiver in &mut self.energy_events {
            loop {
                match receiver.try_recv() {
                    Ok(event) if event.is_depleted() && self.exhausted.insert(event.node) => match event.cause {
                        EnergyCause::Failure => self.stats.failures += 1,
                        _ => self.stats.depletions += 1,
                    },
                    Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                    Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                }
            }
        }
    }
}

fn normalize(a: usize, b: usize) -> (usize, usize) {
    if a < b { (a, b) } else { (b, a) }
}

fn contact_id(a: usize, b: usize, n: usize) -> ContactId {
    ContactId((a * n + b) as u64)
}
