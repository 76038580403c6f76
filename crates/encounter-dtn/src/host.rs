//! Host simulator boundary
//!
//! The routing engine only decides *whether* and *what* to transfer. The
//! host simulator owns contacts, buffers, and the transfer itself, and
//! exposes them through [`TransferHost`]. The node at the other end of a
//! contact is seen through the read-only [`PeerView`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use encounter_core::PeerIdentity;

use crate::message::{Message, MessageId};
use crate::prophet::ProphetState;

/// Identifier of an open contact, assigned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContactId(pub u64);

/// An open contact with another node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenContact<I: PeerIdentity> {
    /// Host-assigned identifier
    pub id: ContactId,
    /// Node at the other end
    pub peer: I,
}

impl<I: PeerIdentity> OpenContact<I> {
    /// Create a new contact handle
    pub fn new(id: ContactId, peer: I) -> Self {
        Self { id, peer }
    }
}

/// Host's answer to a transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStart {
    /// The transfer is under way
    Started,
    /// The contact or the peer is busy; try something else
    Busy,
    /// The peer refused this message (already has it, no room)
    Denied,
}

impl TransferStart {
    /// Check if the transfer started
    pub fn is_started(&self) -> bool {
        matches!(self, TransferStart::Started)
    }
}

/// Buffer ordering used to break ties between candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueueMode {
    /// Oldest arrival first
    #[default]
    Fifo,
    /// Newest arrival first
    Lifo,
}

impl QueueMode {
    /// Compare two buffered messages by arrival time, then by id
    pub fn compare<I: PeerIdentity>(&self, a: &Message<I>, b: &Message<I>) -> Ordering {
        let by_arrival = a
            .received_at
            .partial_cmp(&b.received_at)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id));
        match self {
            QueueMode::Fifo => by_arrival,
            QueueMode::Lifo => by_arrival.reverse(),
        }
    }
}

/// Read-only view of the node at the other end of a contact
pub trait PeerView<I: PeerIdentity> {
    /// Whether the peer is in the middle of any transfer
    fn is_transferring(&self) -> bool;

    /// Whether the peer already buffers this message
    fn has_message(&self, id: MessageId) -> bool;

    /// The peer's delivery-predictability model, if it runs one
    fn predictability(&self) -> Option<&ProphetState<I>> {
        None
    }
}

/// Operations the host simulator provides to the scheduler
pub trait TransferHost<I: PeerIdentity> {
    /// Whether at least one outbound transfer is active
    fn is_sending(&self) -> bool;

    /// Whether at least one inbound transfer is active
    fn is_receiving(&self) -> bool;

    /// Whether any transfer is active
    fn is_transferring(&self) -> bool {
        self.is_sending() || self.is_receiving()
    }

    /// Whether a new transfer could start (buffer non-empty, interface free)
    fn can_start_transfer(&self) -> bool;

    /// Contacts currently open, in the host's contact-list order
    fn open_contacts(&self) -> Vec<OpenContact<I>>;

    /// Messages currently buffered
    fn buffered(&self) -> Vec<Message<I>>;

    /// Read-only view of a connected peer
    fn peer(&self, peer: &I) -> Option<&dyn PeerView<I>>;

    /// Attempt to start sending `message` over `contact`
    fn start_transfer(&mut self, message: &Message<I>, contact: &OpenContact<I>) -> TransferStart;

    /// Queue-mode comparator for buffered messages
    fn queue_order(&self, a: &Message<I>, b: &Message<I>) -> Ordering {
        QueueMode::Fifo.compare(a, b)
    }
}
