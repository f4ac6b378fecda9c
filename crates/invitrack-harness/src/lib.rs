//! Deterministic simulation harness for the invite attribution engine.
//!
//! Provides a scriptable [`SimPlatform`] and a paused-clock [`SimEnv`] so the
//! real [`invitrack_server::Engine`] runs reproducibly in tests, including
//! under platform outages, lagging usage counters and lost events.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation of one community.
//! [`SimDriver`] applies each operation to both the model and the engine and
//! compares their observable results.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold across every
//! execution path. Use [`InvariantRegistry::standard()`] after each event and
//! [`InvariantRegistry::after_reconcile()`] after a reconciliation pass.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod model;
pub mod scenario;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_platform;

pub use invariants::{
    AttributedMembersPresent, CommunitySnapshot, CountMatchesAttributions, Invariant,
    InvariantKind, InvariantRegistry, InvariantResult, LedgerSnapshot, PrivilegeMatchesThreshold,
    Violation,
};
pub use model::{ModelStep, ModelWorld, Operation};
pub use scenario::{Scenario, TrafficProfile};
pub use sim_driver::{SIM_COMMUNITY, SimDriver, SimDriverError};
pub use sim_env::{SIM_EPOCH_SECS, SimEnv};
pub use sim_platform::SimPlatform;
