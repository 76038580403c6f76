//! Text-backed oracle schedules
//!
//! Two line-oriented formats feed the connectivity gate:
//!
//! ```text
//! # failures: <slot> <node>...
//! 600 3 17 42
//!
//! # neighbors: <slot> <node> <peer>...
//! 0 n1 n2 n7
//! ```
//!
//! Node tokens are either full identities (`n17`) or bare indices, which are
//! placed in the schedule's group. Blank lines and lines starting with `#`
//! are ignored. A line with an unparsable slot or node token is skipped on
//! its own with a warning; the rest of the schedule still loads.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use tracing::{debug, warn};

use encounter_core::{DEFAULT_GROUP, FailureOracle, NeighborOracle, NodeId};

use crate::error::ScheduleError;

fn parse_node(token: &str, group: char) -> Option<NodeId> {
    if token.bytes().all(|b| b.is_ascii_digit()) {
        return token.parse().ok().map(|index| NodeId::new(group, index));
    }
    token.parse().ok()
}

/// Split a data line into its slot and node tokens
///
/// Returns `None` for comments and blank lines, `Some(Err(()))` for lines
/// that cannot be parsed.
fn parse_line(line: &str, group: char) -> Option<Result<(u64, Vec<NodeId>), ()>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut tokens = line.split_whitespace();
    let parsed = tokens
        .next()
        .and_then(|slot| slot.parse::<u64>().ok())
        .and_then(|slot| {
            tokens
                .map(|token| parse_node(token, group))
                .collect::<Option<Vec<_>>>()
                .map(|nodes| (slot, nodes))
        });
    Some(parsed.ok_or(()))
}

fn read(path: &Path) -> Result<String, ScheduleError> {
    std::fs::read_to_string(path).map_err(|source| ScheduleError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Failed nodes keyed by exact time slot
#[derive(Debug, Clone, Default)]
pub struct FailureSchedule {
    slots: HashMap<u64, HashSet<NodeId>>,
}

impl FailureSchedule {
    /// Parse a schedule whose bare indices belong to the default group
    pub fn parse(text: &str) -> Self {
        Self::parse_with_group(text, DEFAULT_GROUP)
    }

    /// Parse a schedule, placing bare indices in `group`
    ///
    /// Several lines for the same slot are merged.
    pub fn parse_with_group(text: &str, group: char) -> Self {
        let mut slots: HashMap<u64, HashSet<NodeId>> = HashMap::new();

        for (number, line) in text.lines().enumerate() {
            match parse_line(line, group) {
                None => {}
                Some(Ok((slot, nodes))) => slots.entry(slot).or_default().extend(nodes),
                Some(Err(())) => {
                    warn!(line = number + 1, content = line, "Skipping malformed failure line");
                }
            }
        }

        debug!(slots = slots.len(), "Failure schedule loaded");
        Self { slots }
    }

    /// Load a schedule file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScheduleError> {
        Ok(Self::parse(&read(path.as_ref())?))
    }

    /// Number of slots with at least one entry
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the schedule lists no failures at all
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl FailureOracle<NodeId> for FailureSchedule {
    fn failed_at(&self, slot: u64) -> HashSet<NodeId> {
        self.slots.get(&slot).cloned().unwrap_or_default()
    }
}

/// Scheduled neighbors per node, as of the most recent recorded slot
#[derive(Debug, Clone, Default)]
pub struct NeighborSchedule {
    nodes: HashMap<NodeId, BTreeMap<u64, Vec<NodeId>>>,
}

impl NeighborSchedule {
    /// Parse a schedule whose bare indices belong to the default group
    pub fn parse(text: &str) -> Self {
        Self::parse_with_group(text, DEFAULT_GROUP)
    }

    /// Parse a schedule, placing bare indices in `group`
    ///
    /// A line with a node but no peers records that the node is isolated
    /// from that slot on. A later line for the same node and slot replaces
    /// the earlier one.
    pub fn parse_with_group(text: &str, group: char) -> Self {
        let mut schedule = Self::default();

        for (number, line) in text.lines().enumerate() {
            match parse_line(line, group) {
                None => {}
                Some(Ok((slot, nodes))) if !nodes.is_empty() => {
                    let mut nodes = nodes.into_iter();
                    if let Some(node) = nodes.next() {
                        schedule.insert(slot, node, nodes.collect());
                    }
                }
                Some(_) => {
                    warn!(line = number + 1, content = line, "Skipping malformed neighbor line");
                }
            }
        }

        debug!(nodes = schedule.nodes.len(), "Neighbor schedule loaded");
        schedule
    }

    /// Load a schedule file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScheduleError> {
        Ok(Self::parse(&read(path.as_ref())?))
    }

    /// Record the neighbors of `node` from `slot` on
    pub fn insert(&mut self, slot: u64, node: NodeId, peers: Vec<NodeId>) {
        self.nodes.entry(node).or_default().insert(slot, peers);
    }

    /// Every node that has at least one record
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Whether the schedule has no records
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl NeighborOracle<NodeId> for NeighborSchedule {
    fn neighbors_at(&self, node: &NodeId, slot: u64) -> Vec<NodeId> {
        self.nodes
            .get(node)
            .and_then(|records| records.range(..=slot).next_back())
            .map(|(_, peers)| peers.clone())
            .unwrap_or_default()
    }
}
