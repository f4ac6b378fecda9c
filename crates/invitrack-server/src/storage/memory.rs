#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use invitrack_core::{
    AttributionRecord, CommunityId, CountCorrection, CounterAggregate, JoinOutcome, LeaveOutcome,
    MemberId,
};

use super::{Storage, StorageError, counter_corrections};

/// In-memory ledger for testing and simulation.
///
/// Both relations are ordered maps keyed by `(community, member)`, so a
/// community's rows form one contiguous range. All state sits behind a
/// single `Arc<Mutex<>>`; holding the lock for the whole method gives each
/// operation the same all-or-nothing behavior as a redb transaction.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    /// (community, invitee) -> record
    attributions: BTreeMap<(CommunityId, MemberId), AttributionRecord>,

    /// (community, inviter) -> count
    counters: BTreeMap<(CommunityId, MemberId), u64>,
}

/// Key range covering every member of one community.
fn community_range(
    community: CommunityId,
) -> std::ops::RangeInclusive<(CommunityId, MemberId)> {
    (community, MemberId(0))..=(community, MemberId(u64::MAX))
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryStorageInner::default())) }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStorageInner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Total number of attribution records across all communities.
    ///
    /// Useful for debugging and testing.
    pub fn attribution_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.attributions.len())
    }

    /// Overwrite a counter without touching attribution records.
    ///
    /// Simulates drift left behind by a crash between ledger writes. Only
    /// meant for tests of the reconciliation path.
    pub fn force_counter(
        &self,
        community: CommunityId,
        inviter: MemberId,
        count: u64,
    ) -> Result<(), StorageError> {
        self.lock()?.counters.insert((community, inviter), count);
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn record_join(&self, record: &AttributionRecord) -> Result<JoinOutcome, StorageError> {
        let mut inner = self.lock()?;

        if let Some(existing) = inner.attributions.get(&(record.community, record.invitee)) {
            let inviter = existing.inviter;
            let count = inner.counters.get(&(record.community, inviter)).copied().unwrap_or(0);
            return Ok(JoinOutcome {
                inviter,
                is_new_attribution: false,
                previous_count: count,
                count,
            });
        }

        inner.attributions.insert((record.community, record.invitee), record.clone());

        let counter = inner.counters.entry((record.community, record.inviter)).or_insert(0);
        let previous_count = *counter;
        *counter = counter.saturating_add(1);

        Ok(JoinOutcome {
            inviter: record.inviter,
            is_new_attribution: true,
            previous_count,
            count: *counter,
        })
    }

    fn record_leave(
        &self,
        community: CommunityId,
        invitee: MemberId,
    ) -> Result<Option<LeaveOutcome>, StorageError> {
        let mut inner = self.lock()?;

        let Some(record) = inner.attributions.remove(&(community, invitee)) else {
            return Ok(None);
        };

        let counter = inner.counters.entry((community, record.inviter)).or_insert(0);
        let previous_count = *counter;
        *counter = counter.saturating_sub(1);

        Ok(Some(LeaveOutcome { inviter: record.inviter, previous_count, count: *counter }))
    }

    fn read_count(&self, community: CommunityId, inviter: MemberId) -> Result<u64, StorageError> {
        Ok(self.lock()?.counters.get(&(community, inviter)).copied().unwrap_or(0))
    }

    fn load_attribution(
        &self,
        community: CommunityId,
        invitee: MemberId,
    ) -> Result<Option<AttributionRecord>, StorageError> {
        Ok(self.lock()?.attributions.get(&(community, invitee)).cloned())
    }

    fn list_attributions(
        &self,
        community: CommunityId,
    ) -> Result<Vec<AttributionRecord>, StorageError> {
        let inner = self.lock()?;
        Ok(inner.attributions.range(community_range(community)).map(|(_, r)| r.clone()).collect())
    }

    fn list_counters(&self, community: CommunityId) -> Result<Vec<CounterAggregate>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .counters
            .range(community_range(community))
            .map(|(&(community, inviter), &count)| CounterAggregate { community, inviter, count })
            .collect())
    }

    fn list_communities(&self) -> Result<Vec<CommunityId>, StorageError> {
        let inner = self.lock()?;
        let communities: BTreeSet<CommunityId> = inner
            .attributions
            .keys()
            .chain(inner.counters.keys())
            .map(|&(community, _)| community)
            .collect();
        Ok(communities.into_iter().collect())
    }

    fn prune_attributions(
        &self,
        community: CommunityId,
        members: &HashSet<MemberId>,
    ) -> Result<Vec<AttributionRecord>, StorageError> {
        let mut inner = self.lock()?;

        let absent: Vec<(CommunityId, MemberId)> = inner
            .attributions
            .range(community_range(community))
            .filter(|&(&(_, invitee), _)| !members.contains(&invitee))
            .map(|(&key, _)| key)
            .collect();

        Ok(absent.into_iter().filter_map(|key| inner.attributions.remove(&key)).collect())
    }

    fn rebuild_counters(&self, community: CommunityId) -> Result<Vec<CountCorrection>, StorageError> {
        let mut inner = self.lock()?;

        let mut actual: BTreeMap<MemberId, u64> = BTreeMap::new();
        for record in inner.attributions.range(community_range(community)).map(|(_, r)| r) {
            *actual.entry(record.inviter).or_insert(0) += 1;
        }

        let stored: BTreeMap<MemberId, u64> = inner
            .counters
            .range(community_range(community))
            .map(|(&(_, inviter), &count)| (inviter, count))
            .collect();

        let corrections = counter_corrections(&stored, &actual);

        for inviter in stored.keys() {
            inner.counters.remove(&(community, *inviter));
        }
        for (inviter, count) in actual {
            inner.counters.insert((community, inviter), count);
        }

        Ok(corrections)
    }
}
