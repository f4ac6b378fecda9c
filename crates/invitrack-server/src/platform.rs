//! Chat platform collaborator.
//!
//! The engine never talks to the platform directly; the host implements
//! [`Platform`] over whatever client it uses. Reads are expected to be
//! eventually consistent: invite usage counters may lag behind the join event
//! that bumped them.

use std::{collections::HashSet, future::Future};

use invitrack_core::{CommunityId, InviteSet, MemberId, PrivilegeAction, Threshold};
use thiserror::Error;

/// Errors from platform reads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Platform API failed or was unreachable. The event is dropped.
    #[error("platform unavailable: {0}")]
    Unavailable(String),

    /// The host is not (or no longer) part of the community.
    #[error("community {0} not found")]
    CommunityNotFound(CommunityId),
}

/// Errors from applying a privilege.
///
/// Always logged and swallowed; the ledger is never rolled back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrivilegeError {
    /// The community has no role carrying the privilege.
    #[error("privilege role {privilege:?} missing")]
    RoleMissing {
        /// Configured privilege name
        privilege: String,
    },

    /// The inviter is no longer a member.
    #[error("member {0} not found")]
    MemberNotFound(MemberId),

    /// Role change or notification could not be delivered.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Payload for the notification sent alongside a grant or revoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeNotice {
    /// Threshold the inviter crossed
    pub threshold: Threshold,
    /// Display name of the community
    pub community_name: String,
    /// Display name of the privilege
    pub privilege_name: String,
}

/// A grant or revoke to apply to one inviter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeRequest {
    /// Community the privilege lives in
    pub community: CommunityId,
    /// Inviter whose count crossed the threshold
    pub inviter: MemberId,
    /// Grant or revoke
    pub action: PrivilegeAction,
    /// Notification content
    pub notice: PrivilegeNotice,
}

/// Operations the engine needs from the chat platform.
///
/// Implementations must be cheap to share: the engine calls them from many
/// concurrent event handlers.
pub trait Platform: Send + Sync + 'static {
    /// Every invite code of the community with its current usage counter.
    fn fetch_live_invites(
        &self,
        community: CommunityId,
    ) -> impl Future<Output = Result<InviteSet, FetchError>> + Send;

    /// Ids of everyone currently in the community.
    fn fetch_current_members(
        &self,
        community: CommunityId,
    ) -> impl Future<Output = Result<HashSet<MemberId>, FetchError>> + Send;

    /// Grant or revoke the privilege and notify the inviter.
    ///
    /// Must be idempotent: granting an already-held privilege succeeds.
    fn apply_privilege(
        &self,
        request: &PrivilegeRequest,
    ) -> impl Future<Output = Result<(), PrivilegeError>> + Send;

    /// Human-readable community name for notices.
    fn community_name(&self, community: CommunityId) -> String {
        community.to_string()
    }
}
