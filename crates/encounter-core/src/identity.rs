//! Node identity abstractions
//!
//! This module provides the [`PeerIdentity`] trait that abstracts over
//! different identity implementations, and [`NodeId`], the group-prefixed
//! identity used by the simulator (`n0`, `n1`, ... `n57`).
//!
//! The ordinal index of an identity drives the backbone partition rule: nodes
//! at or above a configured index are allowed to talk to each other
//! regardless of the contact schedule.

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::IdentityError;

/// Group prefix used for ordinary (energy-constrained) nodes
pub const DEFAULT_GROUP: char = 'n';

/// Trait for node identity abstraction
///
/// This trait allows the routing engine to work with any identity the host
/// simulator uses, as long as it can be compared, hashed, and optionally
/// mapped to an ordinal index.
pub trait PeerIdentity:
    Clone + Eq + Ord + Hash + Send + Sync + Debug + Display + Serialize + DeserializeOwned + 'static
{
    /// Ordinal index of this identity, if it has one
    fn ordinal(&self) -> Option<u32>;

    /// Group prefix of this identity, if it has one
    fn group(&self) -> Option<char> {
        None
    }

    /// Get a short display form (for logging)
    fn short_id(&self) -> String {
        format!("{}", self)
    }
}

/// Group-prefixed node identity
///
/// Displays and parses as the group character followed by the decimal index,
/// e.g. `n30`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Group prefix
    pub group: char,
    /// Ordinal index within the group
    pub index: u32,
}

impl NodeId {
    /// Create a node identity in the given group
    pub fn new(group: char, index: u32) -> Self {
        Self { group, index }
    }

    /// Create a node identity in the default group
    pub fn node(index: u32) -> Self {
        Self::new(DEFAULT_GROUP, index)
    }

    /// Generate identities `0..count` in the default group
    pub fn range(count: u32) -> Vec<Self> {
        (0..count).map(Self::node).collect()
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.group, self.index)
    }
}

impl FromStr for NodeId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let group = chars
            .next()
            .filter(|c| c.is_ascii_alphabetic())
            .ok_or_else(|| IdentityError::InvalidFormat(s.to_string()))?;

        let digits = chars.as_str();
        if digits.is_empty() {
            return Err(IdentityError::MissingIndex(s.to_string()));
        }

        let index = digits
            .parse::<u32>()
            .map_err(|_| IdentityError::InvalidFormat(s.to_string()))?;

        Ok(Self { group, index })
    }
}

impl PeerIdentity for NodeId {
    fn ordinal(&self) -> Option<u32> {
        Some(self.index)
    }

    fn group(&self) -> Option<char> {
        Some(self.group)
    }
}
