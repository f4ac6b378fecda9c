//! Event engine.
//!
//! Ties together the snapshot store, the attribution resolver, the counter
//! ledger and the threshold controller.
//!
//! # Join
//!
//! ```text
//! lock(community) ─► debounce ─► already attributed? ─► fetch live invites
//!                 ─► refresh snapshot ─► resolve ─► record_join ─► unlock
//!                 ─► threshold ─► apply privilege
//! ```
//!
//! # Leave
//!
//! ```text
//! lock(community) ─► record_leave ─► unlock ─► threshold ─► apply privilege
//! ```
//!
//! Every event queues on the community lock the moment it arrives, so events
//! of one community run in arrival order: a leave that arrives during a
//! join's debounce waits for that join. The debounce is measured from
//! arrival, so joins queued behind each other do not add up their delays.
//! Privilege calls happen after the lock is released, so a slow platform
//! never holds up the next event.
//!
//! Any fetch or ledger failure drops the event with an error and no partial
//! attribution. There is no retry: reconciliation is the backstop.

use std::{collections::BTreeSet, future::Future, time::Duration};

use invitrack_core::{
    AttributionRecord, CommunityId, Direction, Environment, MemberId, Threshold, ThresholdAction,
    evaluate, on_count_change, resolve,
};

use crate::{
    error::EngineError,
    executor,
    platform::{FetchError, Platform, PrivilegeNotice, PrivilegeRequest},
    reconcile::{ReconcileReport, reconcile_ledger},
    snapshot_store::SnapshotStore,
    storage::Storage,
};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Attributed invites required for the privilege
    pub threshold: Threshold,
    /// Wait between a join event and the invite fetch, giving the platform
    /// time to publish the new usage counter
    pub debounce_delay: Duration,
    /// Upper bound on any single platform read
    pub fetch_timeout: Duration,
    /// Display name of the privilege, used in notices
    pub privilege_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: Threshold::default(),
            debounce_delay: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(10),
            privilege_name: "VIP".to_string(),
        }
    }
}

/// Membership notification from the platform.
///
/// Delivery is at-least-once and may be out of order across members, but is
/// ordered for any single member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberEvent {
    /// `member` joined `community`
    Joined {
        /// Community joined
        community: CommunityId,
        /// New member
        member: MemberId,
    },

    /// `member` left (or was removed from) `community`
    Left {
        /// Community left
        community: CommunityId,
        /// Departed member
        member: MemberId,
    },
}

impl MemberEvent {
    /// Community the event belongs to.
    pub fn community(&self) -> CommunityId {
        match self {
            Self::Joined { community, .. } | Self::Left { community, .. } => *community,
        }
    }

    /// Member the event is about.
    pub fn member(&self) -> MemberId {
        match self {
            Self::Joined { member, .. } | Self::Left { member, .. } => *member,
        }
    }
}

/// What handling one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// First observation of the community; the snapshot cache was filled and
    /// nothing could be attributed.
    CacheWarmed,

    /// No invite could be identified (vanity URL, lagging counter, or an
    /// invite with no owner).
    NotAttributable,

    /// The join was credited to `inviter`.
    Attributed {
        /// Credited inviter
        inviter: MemberId,
        /// Invite code used
        code: String,
        /// Inviter's count after the join
        count: u64,
        /// Threshold decision for the transition
        action: ThresholdAction,
    },

    /// The member was already attributed; nothing changed.
    DuplicateJoin {
        /// Inviter of the existing record
        inviter: MemberId,
        /// Inviter's unchanged count
        count: u64,
    },

    /// An attributed member left and the inviter's count dropped.
    Departed {
        /// Inviter the member was attributed to
        inviter: MemberId,
        /// Inviter's count after the leave
        count: u64,
        /// Threshold decision for the transition
        action: ThresholdAction,
    },

    /// A member with no attribution left (joined before tracking began, or
    /// already pruned).
    Untracked,
}

/// Invite attribution engine.
///
/// Shared by reference across concurrent event handlers. Events for different
/// communities proceed in parallel; events for the same community are
/// serialized by the snapshot store lock.
pub struct Engine<E, S, P>
where
    E: Environment,
    S: Storage,
    P: Platform,
{
    env: E,
    storage: S,
    platform: P,
    snapshots: SnapshotStore,
    config: EngineConfig,
}

impl<E, S, P> Engine<E, S, P>
where
    E: Environment,
    S: Storage,
    P: Platform,
{
    /// Create an engine with a cold snapshot cache.
    pub fn new(env: E, storage: S, platform: P, config: EngineConfig) -> Self {
        Self { env, storage, platform, snapshots: SnapshotStore::new(), config }
    }

    /// Environment (clock, sleep).
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ledger backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Platform collaborator.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Snapshot cache.
    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Handle one membership event.
    ///
    /// # Errors
    ///
    /// - `EngineError::Fetch` / `EngineError::FetchTimeout` if the platform
    ///   read failed. The snapshot cache and ledger are untouched.
    /// - `EngineError::Storage` if the ledger transaction failed. The snapshot
    ///   may already have been refreshed; the join is lost until the next
    ///   reconciliation.
    pub async fn handle_event(&self, event: MemberEvent) -> Result<EventOutcome, EngineError> {
        self.handle_event_received(event, self.env.now()).await
    }

    /// Handle an event that arrived at `received_at`.
    ///
    /// For callers that queue events before handing them over: the join
    /// debounce counts from `received_at`, not from this call.
    pub async fn handle_event_received(
        &self,
        event: MemberEvent,
        received_at: E::Instant,
    ) -> Result<EventOutcome, EngineError> {
        match event {
            MemberEvent::Joined { community, member } => {
                self.handle_join(community, member, received_at).await
            },
            MemberEvent::Left { community, member } => self.handle_leave(community, member).await,
        }
    }

    async fn handle_join(
        &self,
        community: CommunityId,
        member: MemberId,
        received_at: E::Instant,
    ) -> Result<EventOutcome, EngineError> {
        let mut guard = self.snapshots.lock(community).await;

        let waited = self.env.now() - received_at;
        if let Some(remaining) = self.config.debounce_delay.checked_sub(waited) {
            self.env.sleep(remaining).await;
        }

        // Redelivered join: leave the snapshot alone so the usage delta of a
        // concurrent join is not consumed here.
        if let Some(existing) = self.storage.load_attribution(community, member)? {
            let count = self.storage.read_count(community, existing.inviter)?;
            tracing::debug!(%community, %member, inviter = %existing.inviter, count, "duplicate join");
            return Ok(EventOutcome::DuplicateJoin { inviter: existing.inviter, count });
        }

        let live = self.fetch(community, self.platform.fetch_live_invites(community)).await?;
        let refreshed = guard.refresh(live);

        let Some(old) = refreshed.old else {
            tracing::debug!(%community, %member, invites = refreshed.new.len(), "snapshot cache warmed");
            return Ok(EventOutcome::CacheWarmed);
        };

        let Some(used) = resolve(&old, &refreshed.new) else {
            tracing::debug!(%community, %member, "no invite usage detected");
            return Ok(EventOutcome::NotAttributable);
        };

        let Some(inviter) = used.inviter else {
            tracing::debug!(%community, %member, code = %used.code, "invite has no owner");
            return Ok(EventOutcome::NotAttributable);
        };

        let record = AttributionRecord::new(community, member, inviter)
            .with_invite_code(used.code.clone())
            .attributed_at(self.env.wall_clock_secs());
        let outcome = self.storage.record_join(&record)?;

        drop(guard);

        if !outcome.is_new_attribution {
            tracing::debug!(%community, %member, inviter = %outcome.inviter, "duplicate join");
            return Ok(EventOutcome::DuplicateJoin {
                inviter: outcome.inviter,
                count: outcome.count,
            });
        }

        let action = on_count_change(
            Direction::Grew,
            outcome.previous_count,
            outcome.count,
            self.config.threshold,
        );

        tracing::info!(
            %community,
            %member,
            %inviter,
            code = %used.code,
            count = outcome.count,
            ?action,
            "join attributed"
        );

        self.dispatch(community, inviter, action).await;

        Ok(EventOutcome::Attributed { inviter, code: used.code, count: outcome.count, action })
    }

    async fn handle_leave(
        &self,
        community: CommunityId,
        member: MemberId,
    ) -> Result<EventOutcome, EngineError> {
        let guard = self.snapshots.lock(community).await;
        let outcome = self.storage.record_leave(community, member)?;
        drop(guard);

        let Some(outcome) = outcome else {
            tracing::debug!(%community, %member, "untracked member left");
            return Ok(EventOutcome::Untracked);
        };

        let action = on_count_change(
            Direction::Shrank,
            outcome.previous_count,
            outcome.count,
            self.config.threshold,
        );

        tracing::info!(
            %community,
            %member,
            inviter = %outcome.inviter,
            count = outcome.count,
            ?action,
            "attributed member left"
        );

        self.dispatch(community, outcome.inviter, action).await;

        Ok(EventOutcome::Departed { inviter: outcome.inviter, count: outcome.count, action })
    }

    /// Warm the snapshot cache for a community, then reconcile it.
    ///
    /// Called when the host gains access to a community (startup or newly
    /// joined). After this the first join is attributable.
    pub async fn initialize_community(
        &self,
        community: CommunityId,
    ) -> Result<ReconcileReport, EngineError> {
        {
            let mut guard = self.snapshots.lock(community).await;
            let live = self.fetch(community, self.platform.fetch_live_invites(community)).await?;
            let refreshed = guard.refresh(live);
            tracing::debug!(%community, invites = refreshed.new.len(), "snapshot cache warmed");
        }

        self.reconcile(community).await
    }

    /// Prune departed invitees and rebuild counters for one community.
    ///
    /// Holds the community lock for the whole pass, so it never overlaps a
    /// join, a leave or another reconciliation of the same community. Every
    /// corrected count goes through the threshold controller: a drift fix
    /// that crosses the threshold grants or revokes like any other change.
    ///
    /// Afterwards the grant is re-issued for every inviter at or above the
    /// threshold that no correction already granted. Grants are idempotent
    /// upstream, so this retries any grant that failed earlier.
    pub async fn reconcile(&self, community: CommunityId) -> Result<ReconcileReport, EngineError> {
        let guard = self.snapshots.lock(community).await;
        let members = self.fetch(community, self.platform.fetch_current_members(community)).await?;
        let report = reconcile_ledger(&self.storage, community, &members)?;
        let counters = self.storage.list_counters(community)?;
        drop(guard);

        if report.is_clean() {
            tracing::info!(%community, members = members.len(), "ledger consistent");
        } else {
            tracing::info!(
                %community,
                members = members.len(),
                pruned = report.pruned.len(),
                corrected = report.corrections.len(),
                "ledger reconciled"
            );
        }

        for correction in &report.corrections {
            tracing::warn!(
                %community,
                inviter = %correction.inviter,
                stored = correction.stored,
                actual = correction.actual,
                "counter drift corrected"
            );

            let action = evaluate(correction.stored, correction.actual, self.config.threshold);
            self.dispatch(community, correction.inviter, action).await;
        }

        let granted: BTreeSet<MemberId> = report
            .corrections
            .iter()
            .filter(|c| evaluate(c.stored, c.actual, self.config.threshold) == ThresholdAction::Grant)
            .map(|c| c.inviter)
            .collect();
        let eligible: Vec<MemberId> = counters
            .iter()
            .filter(|c| c.count >= self.config.threshold.get() && !granted.contains(&c.inviter))
            .map(|c| c.inviter)
            .collect();

        if !eligible.is_empty() {
            tracing::debug!(%community, inviters = eligible.len(), "re-issuing grants");
        }
        for inviter in eligible {
            self.dispatch(community, inviter, ThresholdAction::Grant).await;
        }

        Ok(report)
    }

    /// Stored invite count for an inviter.
    pub fn invite_count(&self, community: CommunityId, inviter: MemberId) -> Result<u64, EngineError> {
        Ok(self.storage.read_count(community, inviter)?)
    }

    /// Drop the cached snapshot of a community the host has left.
    ///
    /// The ledger is kept; if the host rejoins, reconciliation prunes it.
    pub async fn forget_community(&self, community: CommunityId) -> bool {
        let forgotten = self.snapshots.forget(community).await;
        tracing::debug!(%community, forgotten, "snapshot cache dropped");
        forgotten
    }

    /// Communities with ledger rows or a cached snapshot.
    pub async fn known_communities(&self) -> Result<Vec<CommunityId>, EngineError> {
        let mut communities: BTreeSet<CommunityId> =
            self.storage.list_communities()?.into_iter().collect();
        communities.extend(self.snapshots.communities().await);
        Ok(communities.into_iter().collect())
    }

    /// Run a platform read with the configured timeout.
    async fn fetch<T>(
        &self,
        community: CommunityId,
        fetch: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, EngineError> {
        let timeout = self.config.fetch_timeout;
        tokio::select! {
            biased;
            result = fetch => result.map_err(|source| EngineError::Fetch { community, source }),
            () = self.env.sleep(timeout) => Err(EngineError::FetchTimeout { community, timeout }),
        }
    }

    async fn dispatch(&self, community: CommunityId, inviter: MemberId, action: ThresholdAction) {
        let Some(action) = action.privilege() else {
            return;
        };

        let request = PrivilegeRequest {
            community,
            inviter,
            action,
            notice: PrivilegeNotice {
                threshold: self.config.threshold,
                community_name: self.platform.community_name(community),
                privilege_name: self.config.privilege_name.clone(),
            },
        };

        executor::apply_privilege(&self.platform, &request).await;
    }
}
