//! Reference model for model-based testing.
//!
//! [`ModelWorld`] is a deliberately naive reimplementation of one community:
//! plain maps, no storage, no locking, no async. Each [`Operation`] is applied
//! to the model first, which returns the [`ModelStep`] the real engine must
//! reproduce.

mod operation;
mod world;

pub use operation::{InviteSlot, ModelInviter, ModelMember, Operation};
pub use world::{INVITERS, MEMBERS, ModelStep, ModelWorld};
