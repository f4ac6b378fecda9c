//! Ledger reconciliation.
//!
//! The per-event path can drift: an event dropped after a fetch failure, a
//! leave missed while the host was offline, a crash between two ledger
//! transactions. Reconciliation brings the ledger back to the truth in two
//! steps, always in this order:
//!
//! 1. Prune attribution records whose invitee is no longer a member.
//! 2. Rebuild every counter as the number of remaining records per inviter.
//!
//! Pruning first means the rebuilt counters already exclude departed
//! invitees. Running it twice in a row changes nothing the second time.

use std::collections::{BTreeMap, HashSet};

use invitrack_core::{AttributionRecord, CommunityId, CountCorrection, MemberId};

use crate::storage::{Storage, StorageError, counter_corrections};

/// What a reconciliation pass changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Community reconciled
    pub community: CommunityId,
    /// Attribution records deleted because the invitee left
    pub pruned: Vec<AttributionRecord>,
    /// Counters that disagreed with the remaining records
    pub corrections: Vec<CountCorrection>,
}

impl ReconcileReport {
    /// True if the ledger was already consistent.
    pub fn is_clean(&self) -> bool {
        self.pruned.is_empty() && self.corrections.is_empty()
    }
}

/// Prune then rebuild one community's ledger against its member list.
///
/// The caller must make sure no other reconciliation of the same community
/// runs concurrently; the engine does so by holding the community's snapshot
/// lock.
pub fn reconcile_ledger<S: Storage>(
    storage: &S,
    community: CommunityId,
    members: &HashSet<MemberId>,
) -> Result<ReconcileReport, StorageError> {
    let pruned = storage.prune_attributions(community, members)?;
    let corrections = storage.rebuild_counters(community)?;

    Ok(ReconcileReport { community, pruned, corrections })
}

/// Counters that disagree with the attribution records, without writing.
pub fn detect_drift<S: Storage>(
    storage: &S,
    community: CommunityId,
) -> Result<Vec<CountCorrection>, StorageError> {
    let mut actual: BTreeMap<MemberId, u64> = BTreeMap::new();
    for record in storage.list_attributions(community)? {
        *actual.entry(record.inviter).or_insert(0) += 1;
    }

    let stored: BTreeMap<MemberId, u64> = storage
        .list_counters(community)?
        .into_iter()
        .map(|counter| (counter.inviter, counter.count))
        .collect();

    Ok(counter_corrections(&stored, &actual))
}
