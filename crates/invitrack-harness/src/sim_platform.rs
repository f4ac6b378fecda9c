//! Scriptable in-memory chat platform.
//!
//! Tests drive the platform the way real users would (create invites, join
//! through them, leave) and then hand the matching event to the engine. The
//! platform also injects the faults the engine must survive: failing or slow
//! fetches, counters that lag behind joins, and rejected privilege changes.

#![allow(clippy::disallowed_types, reason = "Synchronous state, never held across await")]

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use invitrack_core::{CommunityId, InviteSet, InviteSnapshot, MemberId, PrivilegeAction};
use invitrack_server::{FetchError, Platform, PrivilegeError, PrivilegeRequest};

#[derive(Debug, Clone, Default)]
struct SimInvite {
    inviter: Option<MemberId>,
    /// Uses the platform reports.
    uses: u64,
    /// Uses that happened but are not yet reported.
    unpublished: u64,
}

#[derive(Debug, Clone, Default)]
struct SimCommunity {
    name: String,
    invites: BTreeMap<String, SimInvite>,
    members: BTreeSet<MemberId>,
    privileged: BTreeSet<MemberId>,
}

#[derive(Debug, Default)]
struct SimPlatformState {
    communities: BTreeMap<CommunityId, SimCommunity>,
    requests: Vec<PrivilegeRequest>,
    failing_fetches: u32,
    fetch_delay: Duration,
    privilege_failure: Option<PrivilegeError>,
    invite_fetches: u64,
    member_fetches: u64,
}

/// In-memory platform shared between a test and the engine under test.
///
/// Clone is cheap and every clone sees the same state.
#[derive(Clone, Default)]
pub struct SimPlatform {
    state: Arc<Mutex<SimPlatformState>>,
}

impl SimPlatform {
    /// Platform with no communities.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimPlatformState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_community<T>(
        &self,
        community: CommunityId,
        f: impl FnOnce(&mut SimCommunity) -> T,
    ) -> T {
        let mut state = self.state();
        f(state.communities.entry(community).or_default())
    }

    /// Register a community with a display name.
    pub fn add_community(&self, community: CommunityId, name: impl Into<String>) {
        let name = name.into();
        self.with_community(community, |c| c.name = name);
    }

    /// Remove a community; later fetches fail with `CommunityNotFound`.
    pub fn remove_community(&self, community: CommunityId) {
        self.state().communities.remove(&community);
    }

    /// Create an invite owned by `inviter` with `uses` prior uses.
    pub fn create_invite(
        &self,
        community: CommunityId,
        code: impl Into<String>,
        inviter: MemberId,
        uses: u64,
    ) {
        let invite = SimInvite { inviter: Some(inviter), uses, unpublished: 0 };
        self.with_community(community, |c| c.invites.insert(code.into(), invite));
    }

    /// Create an invite with no owning member (vanity or widget link).
    pub fn create_unowned_invite(&self, community: CommunityId, code: impl Into<String>, uses: u64) {
        let invite = SimInvite { inviter: None, uses, unpublished: 0 };
        self.with_community(community, |c| c.invites.insert(code.into(), invite));
    }

    /// Delete an invite (expired or revoked by a moderator).
    pub fn delete_invite(&self, community: CommunityId, code: &str) {
        self.with_community(community, |c| c.invites.remove(code));
    }

    /// Add members that were present before tracking began.
    pub fn add_members(&self, community: CommunityId, members: impl IntoIterator<Item = MemberId>) {
        self.with_community(community, |c| c.members.extend(members));
    }

    /// `member` joins through `code`; the usage counter updates immediately.
    ///
    /// Returns `false` if the invite does not exist.
    pub fn join_via(&self, community: CommunityId, member: MemberId, code: &str) -> bool {
        self.with_community(community, |c| {
            let Some(invite) = c.invites.get_mut(code) else {
                return false;
            };
            invite.uses += 1;
            c.members.insert(member);
            true
        })
    }

    /// `member` joins through `code`, but the platform keeps reporting the
    /// old counter until [`SimPlatform::publish_uses`].
    pub fn join_via_lagging(&self, community: CommunityId, member: MemberId, code: &str) -> bool {
        self.with_community(community, |c| {
            let Some(invite) = c.invites.get_mut(code) else {
                return false;
            };
            invite.unpublished += 1;
            c.members.insert(member);
            true
        })
    }

    /// Make every lagging counter of the community visible.
    pub fn publish_uses(&self, community: CommunityId) {
        self.with_community(community, |c| {
            for invite in c.invites.values_mut() {
                invite.uses += std::mem::take(&mut invite.unpublished);
            }
        });
    }

    /// `member` joins without any invite counter moving (vanity URL).
    pub fn join_vanity(&self, community: CommunityId, member: MemberId) {
        self.with_community(community, |c| c.members.insert(member));
    }

    /// `member` leaves or is kicked. Sending the leave event is up to the
    /// test; skipping it simulates an event lost while offline.
    pub fn remove_member(&self, community: CommunityId, member: MemberId) {
        self.with_community(community, |c| c.members.remove(&member));
    }

    /// Fail the next `count` fetches with `FetchError::Unavailable`.
    pub fn fail_next_fetches(&self, count: u32) {
        self.state().failing_fetches = count;
    }

    /// Delay every fetch by `delay` (virtual time).
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state().fetch_delay = delay;
    }

    /// Reject every privilege change with `error`, or accept them again.
    pub fn fail_privileges(&self, error: Option<PrivilegeError>) {
        self.state().privilege_failure = error;
    }

    /// Current members of the community.
    pub fn members(&self, community: CommunityId) -> BTreeSet<MemberId> {
        self.with_community(community, |c| c.members.clone())
    }

    /// Whether `member` holds the privilege.
    pub fn has_privilege(&self, community: CommunityId, member: MemberId) -> bool {
        self.with_community(community, |c| c.privileged.contains(&member))
    }

    /// Everyone holding the privilege.
    pub fn privileged(&self, community: CommunityId) -> BTreeSet<MemberId> {
        self.with_community(community, |c| c.privileged.clone())
    }

    /// Reported uses of an invite.
    pub fn invite_uses(&self, community: CommunityId, code: &str) -> Option<u64> {
        self.with_community(community, |c| c.invites.get(code).map(|i| i.uses))
    }

    /// Invite codes of the community, sorted.
    pub fn invite_codes(&self, community: CommunityId) -> Vec<String> {
        self.with_community(community, |c| c.invites.keys().cloned().collect())
    }

    /// Every privilege request received, accepted or not, in order.
    pub fn requests(&self) -> Vec<PrivilegeRequest> {
        self.state().requests.clone()
    }

    /// Number of invite fetches served or failed.
    pub fn invite_fetches(&self) -> u64 {
        self.state().invite_fetches
    }

    /// Number of member fetches served or failed.
    pub fn member_fetches(&self) -> u64 {
        self.state().member_fetches
    }

    fn fetch_delay(&self) -> Duration {
        self.state().fetch_delay
    }

    /// Consume one scripted failure, if any remain.
    fn take_failure(&self) -> Option<FetchError> {
        let mut state = self.state();
        if state.failing_fetches == 0 {
            return None;
        }
        state.failing_fetches -= 1;
        Some(FetchError::Unavailable("simulated outage".to_string()))
    }
}

impl Platform for SimPlatform {
    async fn fetch_live_invites(&self, community: CommunityId) -> Result<InviteSet, FetchError> {
        self.state().invite_fetches += 1;

        let delay = self.fetch_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.take_failure() {
            return Err(error);
        }

        let state = self.state();
        let c = state.communities.get(&community).ok_or(FetchError::CommunityNotFound(community))?;
        Ok(c.invites
            .iter()
            .map(|(code, invite)| InviteSnapshot {
                code: code.clone(),
                uses: invite.uses,
                inviter: invite.inviter,
            })
            .collect())
    }

    async fn fetch_current_members(
        &self,
        community: CommunityId,
    ) -> Result<HashSet<MemberId>, FetchError> {
        self.state().member_fetches += 1;

        let delay = self.fetch_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.take_failure() {
            return Err(error);
        }

        let state = self.state();
        let c = state.communities.get(&community).ok_or(FetchError::CommunityNotFound(community))?;
        Ok(c.members.iter().copied().collect())
    }

    async fn apply_privilege(&self, request: &PrivilegeRequest) -> Result<(), PrivilegeError> {
        let mut state = self.state();
        state.requests.push(request.clone());

        if let Some(error) = state.privilege_failure.clone() {
            return Err(error);
        }

        let c = state.communities.entry(request.community).or_default();
        match request.action {
            PrivilegeAction::Grant => c.privileged.insert(request.inviter),
            PrivilegeAction::Revoke => c.privileged.remove(&request.inviter),
        };
        Ok(())
    }

    fn community_name(&self, community: CommunityId) -> String {
        let state = self.state();
        match state.communities.get(&community) {
            Some(c) if !c.name.is_empty() => c.name.clone(),
            _ => community.to_string(),
        }
    }
}
