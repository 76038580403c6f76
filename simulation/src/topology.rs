//! Encounter plans
//!
//! Provides builders for who-meets-whom schedules:
//! - Line: each node meets its index neighbors every window
//! - Rotating: each window pairs every node with a different offset
//! - Random: each window pairs nodes by repeated random matchings
//! - Custom: build from explicit per-window pair lists
//!
//! An [`EncounterPlan`] converts into the [`NeighborSchedule`] the routing
//! engine reads, and displays in the same line format the schedule parser
//! accepts.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use rand::Rng;
use rand::seq::SliceRandom;

use encounter_core::NodeId;
use encounter_dtn::NeighborSchedule;

/// Scheduled encounters, one set of node pairs per window
#[derive(Debug, Clone, PartialEq)]
pub struct EncounterPlan {
    nodes: Vec<NodeId>,
    window_secs: u64,
    /// Normalized `(low, high)` index pairs per window
    windows: Vec<BTreeSet<(usize, usize)>>,
}

impl EncounterPlan {
    /// Build a plan from explicit pairs
    ///
    /// Self-pairs and indices outside `0..node_count` are dropped.
    pub fn from_windows(node_count: u32, window_secs: u64, windows: Vec<Vec<(u32, u32)>>) -> Self {
        let windows = windows
            .into_iter()
            .map(|pairs| {
                pairs
                    .into_iter()
                    .filter(|&(a, b)| a != b && a < node_count && b < node_count)
                    .map(|(a, b)| normalize(a as usize, b as usize))
                    .collect()
            })
            .collect();

        Self {
            nodes: NodeId::range(node_count),
            window_secs: window_secs.max(1),
            windows,
        }
    }

    /// Nodes covered by the plan
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Window length in seconds
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Number of windows
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Scheduled pairs in window `index`
    pub fn pairs_in(&self, index: usize) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.windows
            .get(index)
            .into_iter()
            .flatten()
            .map(|&(a, b)| (self.nodes[a], self.nodes[b]))
    }

    /// Total scheduled encounters across all windows
    pub fn encounter_count(&self) -> usize {
        self.windows.iter().map(BTreeSet::len).sum()
    }

    fn peers_of(&self, window: usize, node: usize) -> Vec<NodeId> {
        self.windows[window]
            .iter()
            .filter_map(|&(a, b)| match (a == node, b == node) {
                (true, _) => Some(self.nodes[b]),
                (_, true) => Some(self.nodes[a]),
                _ => None,
            })
            .collect()
    }

    /// Convert to the engine's neighbor schedule
    ///
    /// Every node gets a record in every window, so a node with no
    /// encounters in a window is recorded as isolated rather than keeping
    /// its previous neighbors.
    pub fn to_schedule(&self) -> NeighborSchedule {
        let mut schedule = NeighborSchedule::default();
        for window in 0..self.windows.len() {
            let slot = window as u64 * self.window_secs;
            for (index, node) in self.nodes.iter().enumerate() {
                schedule.insert(slot, *node, self.peers_of(window, index));
            }
        }
        schedule
    }
}

impl Display for EncounterPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for window in 0..self.windows.len() {
            let slot = window as u64 * self.window_secs;
            for (index, node) in self.nodes.iter().enumerate() {
                write!(f, "{} {}", slot, node)?;
                for peer in self.peers_of(window, index) {
                    write!(f, " {}", peer)?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

fn normalize(a: usize, b: usize) -> (usize, usize) {
    if a < b { (a, b) } else { (b, a) }
}

/// Builder for common encounter plans
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    node_count: u32,
    window_secs: u64,
    duration_secs: u64,
}

impl PlanBuilder {
    /// Create a builder for `node_count` nodes, one hour in ten-minute windows
    pub fn new(node_count: u32) -> Self {
        Self {
            node_count,
            window_secs: 600,
            duration_secs: 3600,
        }
    }

    /// Set the window length
    pub fn window(mut self, secs: u64) -> Self {
        self.window_secs = secs.max(1);
        self
    }

    /// Set the span the plan covers
    pub fn duration(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    fn window_count(&self) -> usize {
        self.duration_secs.div_ceil(self.window_secs).max(1) as usize
    }

    fn build(&self, windows: Vec<Vec<(u32, u32)>>) -> EncounterPlan {
        EncounterPlan::from_windows(self.node_count, self.window_secs, windows)
    }

    /// Every node meets `i - 1` and `i + 1` in every window
    pub fn line(&self) -> EncounterPlan {
        let pairs: Vec<(u32, u32)> = (1..self.node_count).map(|i| (i - 1, i)).collect();
        self.build(vec![pairs; self.window_count()])
    }

    /// Window `w` pairs node `i` with `i + (w mod (n - 1)) + 1`, wrapping
    ///
    /// Over `n - 1` windows every pair of nodes meets at least once.
    pub fn rotating(&self) -> EncounterPlan {
        let n = self.node_count;
        if n < 2 {
            return self.build(vec![Vec::new(); self.window_count()]);
        }

        let windows = (0..self.window_count())
            .map(|w| {
                let offset = (w as u32 % (n - 1)) + 1;
                (0..n).map(|i| (i, (i + offset) % n)).collect()
            })
            .collect();
        self.build(windows)
    }

    /// Each window is the union of `rounds` random perfect matchings
    pub fn random<R: Rng + ?Sized>(&self, rounds: usize, rng: &mut R) -> EncounterPlan {
        let mut order: Vec<u32> = (0..self.node_count).collect();

        let windows = (0..self.window_count())
            .map(|_| {
                let mut pairs = Vec::new();
                for _ in 0..rounds {
                    order.shuffle(rng);
                    pairs.extend(order.chunks_exact(2).map(|pair| (pair[0], pair[1])));
                }
                pairs
            })
            .collect();
        self.build(windows)
    }
}
