//! # Encounter Simulation
//!
//! A deterministic contact-schedule simulator that drives one
//! [`TransferScheduler`](encounter_dtn::TransferScheduler) per node.
//!
//! ## Overview
//!
//! Nodes only talk during contacts. The world opens a contact whenever the
//! neighbor schedule pairs two live nodes, optionally adds chance contacts the
//! schedule did not predict, and lets every node's routing engine pick one
//! transfer per tick. Transfers land on the following tick.
//!
//! ## Architecture
//!
//! - **Topology** (`topology.rs`): Encounter plans (line, rotating, random)
//!   that become neighbor schedules
//! - **Simulation** (`simulation.rs`): Discrete-time world and statistics
//! - **Scenarios** (`scenarios.rs`): Canned runs and policy comparisons
//!
//! ## Example: Relay Chain
//!
//! ```rust,ignore
//! use encounter_dtn::RouterConfig;
//! use encounter_sim::scenarios;
//!
//! // n0 meets n1 in the first window, n1 meets n2 in the second, ...
//! let report = scenarios::relay_chain(RouterConfig::default(), 3, 600)?;
//! assert_eq!(report.stats.messages_delivered, 1);
//! ```

pub mod scenarios;
pub mod simulation;
pub mod topology;

pub use simulation::{SimConfig, SimError, SimReport, SimStats, Simulation};
pub use topology::{EncounterPlan, PlanBuilder};
