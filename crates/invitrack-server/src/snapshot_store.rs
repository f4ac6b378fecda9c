//! Per-community invite snapshot cache.
//!
//! Each community gets its own slot behind its own async mutex, so refreshes
//! of different communities never wait on each other while refreshes of the
//! same community are serialized. The cache lives for the process only; a
//! restart starts cold and the first event per community warms it.

use std::{collections::HashMap, sync::Arc};

use invitrack_core::{CommunityId, InviteSet};
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<Option<Arc<InviteSet>>>>;

/// Snapshot sets before and after a refresh.
#[derive(Debug, Clone)]
pub struct Refreshed {
    /// Cached set before the refresh. `None` on the first refresh.
    pub old: Option<Arc<InviteSet>>,
    /// The set now cached.
    pub new: Arc<InviteSet>,
}

/// Exclusive access to one community's cached snapshot.
///
/// Held across debounce, fetch, resolve and ledger write so that two joins
/// in the same community cannot both consume the same usage delta.
pub struct SnapshotGuard {
    slot: OwnedMutexGuard<Option<Arc<InviteSet>>>,
}

impl SnapshotGuard {
    /// Currently cached set, if warmed.
    pub fn current(&self) -> Option<Arc<InviteSet>> {
        self.slot.clone()
    }

    /// Replace the cached set with `live`, returning old and new.
    pub fn refresh(&mut self, live: InviteSet) -> Refreshed {
        let new = Arc::new(live);
        let old = self.slot.replace(Arc::clone(&new));
        Refreshed { old, new }
    }
}

/// Cache of the last observed invite set per community.
#[derive(Default)]
pub struct SnapshotStore {
    slots: Mutex<HashMap<CommunityId, Slot>>,
}

impl SnapshotStore {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, community: CommunityId) -> Slot {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(community).or_default())
    }

    /// Wait for exclusive access to a community's snapshot.
    ///
    /// Waiters are served in the order they started waiting.
    pub async fn lock(&self, community: CommunityId) -> SnapshotGuard {
        let slot = self.slot(community).await;
        SnapshotGuard { slot: slot.lock_owned().await }
    }

    /// Currently cached set, if warmed.
    pub async fn current(&self, community: CommunityId) -> Option<Arc<InviteSet>> {
        self.lock(community).await.current()
    }

    /// Communities with a cached set or an event in flight, sorted.
    pub async fn communities(&self) -> Vec<CommunityId> {
        let slots: Vec<(CommunityId, Slot)> = self
            .slots
            .lock()
            .await
            .iter()
            .map(|(community, slot)| (*community, Arc::clone(slot)))
            .collect();

        let mut communities: Vec<CommunityId> = slots
            .into_iter()
            .filter(|(_, slot)| !matches!(slot.try_lock(), Ok(cached) if cached.is_none()))
            .map(|(community, _)| community)
            .collect();
        communities.sort_unstable();
        communities
    }

    /// Drop a community's cached set. Waits for any in-flight holder to
    /// finish; the slot itself stays so later events queue on the same lock.
    ///
    /// Returns `false` if nothing was cached.
    pub async fn forget(&self, community: CommunityId) -> bool {
        let Some(slot) = self.slots.lock().await.get(&community).map(Arc::clone) else {
            return false;
        };
        slot.lock().await.take().is_some()
    }
}
