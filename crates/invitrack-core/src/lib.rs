//! Invitrack core.
//!
//! Pure decision logic for invite attribution, with no I/O and no runtime.
//! Everything here is a function of its inputs so the same code runs under
//! the production runtime and under deterministic simulation.
//!
//! # Components
//!
//! - [`snapshot`]: immutable invite-usage snapshots for one community
//! - [`resolver`]: decides which invite a join consumed
//! - [`threshold`]: decides when a count transition grants or revokes
//! - [`ledger`]: attribution and counter records owned by the ledger
//! - [`env`]: time abstraction for the debounce delay and timeouts

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod ids;
pub mod ledger;
pub mod resolver;
pub mod snapshot;
pub mod threshold;

pub use env::Environment;
pub use ids::{CommunityId, MemberId};
pub use ledger::{AttributionRecord, CountCorrection, CounterAggregate, JoinOutcome, LeaveOutcome};
pub use resolver::{Resolution, UsedInvite, resolve};
pub use snapshot::{InviteSet, InviteSnapshot};
pub use threshold::{
    Direction, PrivilegeAction, Threshold, ThresholdAction, ThresholdError, evaluate,
    on_count_change,
};
