//! # Encounter Core
//!
//! Core traits, types, and errors shared by the Encounter routing engine.
//!
//! The routing engine runs inside a host discrete-event simulator. This crate
//! holds the abstractions that let the engine stay independent of that host:
//! node identities, simulated time, and the oracles that report the contact
//! schedule and node failures.
//!
//! ## Key Traits
//!
//! - [`PeerIdentity`]: Abstraction over node identification, with an ordinal
//!   index used by partition rules
//! - [`Clock`]: Simulated time source
//! - [`NeighborOracle`]: Scheduled-neighbor lookup per time slot
//! - [`FailureOracle`]: Failed-node lookup per time slot
//!
//! ## Key Types
//!
//! - [`NodeId`]: Group-prefixed node identity (`n30`)
//! - [`SimTime`]: Simulated time in seconds
//! - [`EnergyEvent`]: Energy-state change notification

pub mod error;
pub mod event;
pub mod identity;
pub mod time;
pub mod traits;

// Re-export main types
pub use error::*;
pub use event::*;
pub use identity::*;
pub use time::*;
pub use traits::*;
