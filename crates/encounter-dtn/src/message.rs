//! Buffered messages
//!
//! A [`Message`] is the unit the scheduler ranks and hands to the host's
//! transfer primitive. Everything except the replica count is immutable
//! payload metadata; the replica count is only present for messages created
//! under a replication-controlled policy.

use serde::{Deserialize, Serialize};

use encounter_core::{PeerIdentity, SimTime};

/// Unique identifier for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "M{}", self.0)
    }
}

/// A message held in a node's buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct Message<I: PeerIdentity> {
    /// Message identifier, shared by every replica
    pub id: MessageId,
    /// Original sender
    pub from: I,
    /// Final recipient
    pub to: I,
    /// Payload size in bytes
    pub size: usize,
    /// When the original was created
    pub created_at: SimTime,
    /// When this replica arrived in the current buffer
    pub received_at: SimTime,
    /// Hops this replica has travelled
    pub hop_count: u32,
    /// Remaining replicas this node may still hand out (spray-and-wait only)
    copies: Option<u32>,
}

impl<I: PeerIdentity> Message<I> {
    /// Create a new message at its source
    pub fn new(id: MessageId, from: I, to: I, size: usize, created_at: SimTime) -> Self {
        Self {
            id,
            from,
            to,
            size,
            created_at,
            received_at: created_at,
            hop_count: 0,
            copies: None,
        }
    }

    /// Attach a replica count
    pub fn with_copies(mut self, copies: u32) -> Self {
        self.copies = Some(copies);
        self
    }

    /// Replica count, if this message carries one
    pub fn copies(&self) -> Option<u32> {
        self.copies
    }

    /// Overwrite the replica count
    pub fn set_copies(&mut self, copies: u32) {
        self.copies = Some(copies);
    }

    /// Copy this message for a receiving node
    ///
    /// The replica keeps the identifier and payload metadata, records one
    /// more hop, and is stamped with its arrival time.
    pub fn replica(&self, now: SimTime) -> Self {
        let mut replica = self.clone();
        replica.hop_count += 1;
        replica.received_at = now;
        replica
    }

    /// Whether `node` is this message's final recipient
    pub fn is_for(&self, node: &I) -> bool {
        &self.to == node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encounter_core::NodeId;

    fn make_message() -> Message<NodeId> {
        Message::new(
            MessageId(7),
            NodeId::node(1),
            NodeId::node(9),
            1024,
            SimTime::from_secs(10.0),
        )
    }

    #[test]
    fn test_new_message_has_no_copies() {
        let msg = make_message();
        assert_eq!(msg.copies(), None);
        assert_eq!(msg.hop_count, 0);
        assert_eq!(msg.received_at, msg.created_at);
    }

    #[test]
    fn test_replica_records_hop() {
        let msg = make_message().with_copies(4);
        let replica = msg.replica(SimTime::from_secs(25.0));

        assert_eq!(replica.id, msg.id);
        assert_eq!(replica.hop_count, 1);
        assert_eq!(replica.received_at.as_secs(), 25.0);
        assert_eq!(replica.copies(), Some(4));
    }

    #[test]
    fn test_destination_check() {
        let msg = make_message();
        assert!(msg.is_for(&NodeId::node(9)));
        assert!(!msg.is_for(&NodeId::node(1)));
    }

    #[test]
    fn test_message_id_display() {
        assert_eq!(MessageId(42).to_string(), "M42");
    }
}
