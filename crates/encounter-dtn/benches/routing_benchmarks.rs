//! Routing engine performance benchmarks
//!
//! Benchmarks for the per-tick hot paths:
//! - PRoPHET encounters, transitive updates, and aging
//! - Predictability ranking through a full scheduler tick
//! - Spray-and-wait copy splitting
//! - Oracle schedule parsing and lookup
//!
//! Run with: cargo bench -p encounter-dtn

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use encounter_core::{EnergyCause, FailureOracle, NeighborOracle, NodeId, SimTime};
use encounter_dtn::{
    ContactId, EnergyConfig, EnergyLedger, FailureSchedule, GateConfig, GatePolicy, InitialEnergy,
    Message, MessageId, NeighborSchedule, OpenContact, Oracles, PeerView, ProphetConfig,
    ProphetPolicy, ProphetState, ReplicationLedger, SprayConfig, TransferActivity, TransferHost,
    TransferScheduler, TransferStart,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// ============================================================================
// Bench Host Implementation
// ============================================================================

struct BenchPeer<'a> {
    model: &'a ProphetState<NodeId>,
}

impl PeerView<NodeId> for BenchPeer<'_> {
    fn is_transferring(&self) -> bool {
        false
    }

    fn has_message(&self, _id: MessageId) -> bool {
        false
    }

    fn predictability(&self) -> Option<&ProphetState<NodeId>> {
        Some(self.model)
    }
}

/// Host whose peers refuse everything, so every candidate gets tried
struct BenchHost<'a> {
    buffer: Vec<Message<NodeId>>,
    contacts: Vec<OpenContact<NodeId>>,
    peers: HashMap<NodeId, BenchPeer<'a>>,
}

impl TransferHost<NodeId> for BenchHost<'_> {
    fn is_sending(&self) -> bool {
        false
    }

    fn is_receiving(&self) -> bool {
        false
    }

    fn can_start_transfer(&self) -> bool {
        true
    }

    fn open_contacts(&self) -> Vec<OpenContact<NodeId>> {
        self.contacts.clone()
    }

    fn buffered(&self) -> Vec<Message<NodeId>> {
        self.buffer.clone()
    }

    fn peer(&self, peer: &NodeId) -> Option<&dyn PeerView<NodeId>> {
        self.peers.get(peer).map(|p| p as &dyn PeerView<NodeId>)
    }

    fn start_transfer(&mut self, _message: &Message<NodeId>, _contact: &OpenContact<NodeId>) -> TransferStart {
        TransferStart::Denied
    }
}

fn at(secs: f64) -> SimTime {
    SimTime::from_secs(secs)
}

fn populated_model(node: u32, destinations: u32) -> ProphetState<NodeId> {
    let mut state = ProphetState::with_defaults(NodeId::node(node));
    for i in 0..destinations {
        state.encounter(&NodeId::node(1000 + i), at(i as f64));
    }
    state
}

// ============================================================================
// PRoPHET Benchmarks
// ============================================================================

fn bench_prophet_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("prophet");

    group.bench_function("encounter", |b| {
        let mut prophet = ProphetState::with_defaults(NodeId::node(0));
        let mut now = 0.0;
        b.iter(|| {
            now += 1.0;
            prophet.encounter(black_box(&NodeId::node(1)), at(now))
        })
    });

    group.bench_function("predictability_for_same_instant", |b| {
        let mut prophet = populated_model(0, 50);
        b.iter(|| prophet.predictability_for(black_box(&NodeId::node(1010)), at(100.0)))
    });

    group.bench_function("transitive_update_50_destinations", |b| {
        let mut prophet = ProphetState::with_defaults(NodeId::node(0));
        prophet.encounter(&NodeId::node(1), SimTime::ZERO);
        let probs = populated_model(1, 50).snapshot_at(at(50.0));

        b.iter(|| prophet.transitive_update(black_box(&NodeId::node(1)), black_box(&probs), at(50.0)))
    });

    group.bench_function("age_50_destinations", |b| {
        let mut prophet = populated_model(0, 50);
        let mut now = 50.0;
        b.iter(|| {
            now += 30.0;
            prophet.all_probabilities(at(now))
        })
    });

    group.finish();
}

// ============================================================================
// Scheduler Benchmarks
// ============================================================================

fn bench_scheduler_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler");

    let peers: Vec<ProphetState<NodeId>> = (1..=10).map(|i| populated_model(i, 20)).collect();
    let mut schedule = NeighborSchedule::default();
    schedule.insert(0, NodeId::node(0), (1..=10).map(NodeId::node).collect());
    let oracles = Oracles::new(std::sync::Arc::new(schedule), std::sync::Arc::new(FailureSchedule::default()));

    group.bench_function("prophet_tick_10_peers_40_messages", |b| {
        let node = NodeId::node(0);
        let mut scheduler = TransferScheduler::new(
            node,
            ProphetPolicy::new(node, ProphetConfig::default()).unwrap(),
            GateConfig::with_interval(GatePolicy::ScheduleOnly, 600.0),
            EnergyConfig::default(),
            oracles.clone(),
            &mut ChaCha8Rng::seed_from_u64(1),
        )
        .unwrap();

        let mut host = BenchHost {
            buffer: (0..40)
                .map(|i| Message::new(MessageId(i), node, NodeId::node(1000 + (i as u32 % 20)), 1024, SimTime::ZERO))
                .collect(),
            contacts: peers
                .iter()
                .enumerate()
                .map(|(i, p)| OpenContact::new(ContactId(i as u64), *p.local_id()))
                .collect(),
            peers: peers
                .iter()
                .map(|p| (*p.local_id(), BenchPeer { model: p }))
                .collect(),
        };

        b.iter(|| scheduler.tick(black_box(&mut host), at(100.0)))
    });

    group.finish();
}

// ============================================================================
// Spray and Energy Benchmarks
// ============================================================================

fn bench_spray_and_energy(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledgers");

    group.bench_function("binary_split", |b| {
        let ledger = ReplicationLedger::new(SprayConfig::binary(64)).unwrap();
        let template = Message::new(MessageId(1), NodeId::node(0), NodeId::node(9), 64, SimTime::ZERO).with_copies(64);
        b.iter(|| {
            let mut sender = template.clone();
            let mut received = template.clone();
            ledger.on_receive(&mut received);
            ledger.on_transfer_completed(Some(&mut sender));
            black_box((sender, received))
        })
    });

    group.bench_function("energy_tick", |b| {
        let config = EnergyConfig::constrained(InitialEnergy::Fixed(f64::MAX), 0.1, 0.08, 30.0);
        let mut ledger =
            EnergyLedger::new(NodeId::node(0), config, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        let activity = TransferActivity {
            sending: true,
            receiving: true,
        };
        let mut now = 0.0;
        b.iter(|| {
            now += 1.0;
            ledger.tick(black_box(activity), at(now))
        })
    });

    group.bench_function("energy_charge", |b| {
        let config = EnergyConfig::constrained(InitialEnergy::Fixed(f64::MAX), 0.1, 0.08, 30.0);
        let mut ledger =
            EnergyLedger::new(NodeId::node(0), config, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        b.iter(|| ledger.charge(EnergyCause::Scan, black_box(0.1), at(1.0)))
    });

    group.finish();
}

// ============================================================================
// Schedule Benchmarks
// ============================================================================

fn bench_schedules(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedules");

    let mut failures = String::new();
    let mut neighbors = String::new();
    for slot in (0..86_400).step_by(300) {
        let _ = writeln!(failures, "{} {} {}", slot, slot % 57, (slot / 300) % 57);
        for node in 0..10 {
            let _ = writeln!(neighbors, "{} n{} n{} n{}", slot, node, (node + 1) % 10, (node + 3) % 10);
        }
    }

    group.bench_function("parse_failures_1day", |b| {
        b.iter(|| FailureSchedule::parse(black_box(&failures)))
    });

    group.bench_function("parse_neighbors_1day_10_nodes", |b| {
        b.iter(|| NeighborSchedule::parse(black_box(&neighbors)))
    });

    let failure_schedule = FailureSchedule::parse(&failures);
    let neighbor_schedule = NeighborSchedule::parse(&neighbors);

    group.bench_function("failed_at", |b| {
        b.iter(|| -> HashSet<NodeId> { failure_schedule.failed_at(black_box(43_200)) })
    });

    group.bench_function("neighbors_at_between_slots", |b| {
        b.iter(|| neighbor_schedule.neighbors_at(black_box(&NodeId::node(4)), black_box(43_299)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_prophet_operations,
    bench_scheduler_tick,
    bench_spray_and_energy,
    bench_schedules,
);

criterion_main!(benches);
