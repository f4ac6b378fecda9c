//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the ledger at a point in time. Invariants operate on
//! snapshots rather than live storage so every check sees one consistent
//! state.

use std::collections::{BTreeMap, BTreeSet};

use invitrack_core::{CommunityId, MemberId, Threshold};
use invitrack_server::{Storage, StorageError};

use crate::sim_platform::SimPlatform;

/// Snapshot of every community in the ledger.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    /// Threshold the engine runs with.
    pub threshold: Threshold,
    /// Per-community state.
    pub communities: BTreeMap<CommunityId, CommunitySnapshot>,
}

/// Snapshot of one community.
#[derive(Debug, Clone, Default)]
pub struct CommunitySnapshot {
    /// Invitee to inviter, from the attribution records.
    pub attributions: BTreeMap<MemberId, MemberId>,
    /// Stored counters. Inviters without a counter are absent.
    pub counters: BTreeMap<MemberId, u64>,
    /// Platform membership, when a platform was captured.
    pub members: Option<BTreeSet<MemberId>>,
    /// Privilege holders, when a platform was captured.
    pub privileged: Option<BTreeSet<MemberId>>,
}

impl CommunitySnapshot {
    /// Number of records naming `inviter`.
    pub fn records_for(&self, inviter: MemberId) -> u64 {
        self.attributions.values().filter(|&&i| i == inviter).count() as u64
    }

    /// Stored counter for `inviter`, zero if absent.
    pub fn count(&self, inviter: MemberId) -> u64 {
        self.counters.get(&inviter).copied().unwrap_or(0)
    }
}

impl LedgerSnapshot {
    /// Snapshot with no communities.
    pub fn empty(threshold: Threshold) -> Self {
        Self { threshold, communities: BTreeMap::new() }
    }

    /// Read every community from `storage`.
    pub fn capture<S: Storage>(storage: &S, threshold: Threshold) -> Result<Self, StorageError> {
        let mut communities = BTreeMap::new();

        for community in storage.list_communities()? {
            let attributions = storage
                .list_attributions(community)?
                .into_iter()
                .map(|record| (record.invitee, record.inviter))
                .collect();
            let counters = storage
                .list_counters(community)?
                .into_iter()
                .map(|counter| (counter.inviter, counter.count))
                .collect();

            communities.insert(
                community,
                CommunitySnapshot { attributions, counters, ..CommunitySnapshot::default() },
            );
        }

        Ok(Self { threshold, communities })
    }

    /// Add platform membership and privilege holders for `communities`.
    ///
    /// Communities the ledger has never seen are added with empty ledger
    /// state, so a stray grant there is still caught.
    pub fn with_platform(
        mut self,
        platform: &SimPlatform,
        communities: impl IntoIterator<Item = CommunityId>,
    ) -> Self {
        for community in communities {
            let entry = self.communities.entry(community).or_default();
            entry.members = Some(platform.members(community));
            entry.privileged = Some(platform.privileged(community));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use invitrack_core::AttributionRecord;
    use invitrack_server::MemoryStorage;

    use super::*;

    #[test]
    fn capture_reads_records_and_counters() {
        let storage = MemoryStorage::new();
        let guild = CommunityId(1);
        storage.record_join(&AttributionRecord::new(guild, MemberId(10), MemberId(7))).unwrap();
        storage.record_join(&AttributionRecord::new(guild, MemberId(11), MemberId(7))).unwrap();

        let snapshot = LedgerSnapshot::capture(&storage, Threshold::default()).unwrap();
        let community = &snapshot.communities[&guild];

        assert_eq!(community.records_for(MemberId(7)), 2);
        assert_eq!(community.count(MemberId(7)), 2);
        assert_eq!(community.count(MemberId(8)), 0);
        assert!(community.members.is_none());
    }

    #[test]
    fn platform_adds_unknown_communities() {
        let platform = SimPlatform::new();
        platform.add_members(CommunityId(2), [MemberId(1)]);

        let snapshot = LedgerSnapshot::empty(Threshold::default())
            .with_platform(&platform, [CommunityId(2)]);

        let community = &snapshot.communities[&CommunityId(2)];
        assert_eq!(community.members.as_ref().map(BTreeSet::len), Some(1));
        assert!(community.attributions.is_empty());
    }
}
