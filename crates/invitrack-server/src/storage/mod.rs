//! Counter ledger storage.
//!
//! Trait-based abstraction for the two durable relations: attribution
//! records (`community, invitee -> inviter`) and counters
//! (`community, inviter -> count`). The trait is synchronous (no async) to
//! keep transactions short and backend-agnostic.
//!
//! Every method is one transaction. Counter updates are relative
//! (`count = count ± 1`) inside that transaction, never read-then-write
//! across transactions, so concurrent joins credited to the same inviter
//! cannot lose an update.

mod chaotic;
mod error;
mod memory;
mod redb;

use std::collections::{BTreeMap, HashSet};

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
use invitrack_core::{
    AttributionRecord, CommunityId, CountCorrection, CounterAggregate, JoinOutcome, LeaveOutcome,
    MemberId,
};
pub use memory::MemoryStorage;

pub use self::redb::RedbStorage;

/// Storage abstraction for attribution records and counters.
///
/// Must be Clone (shared by the engine, the runtime tasks and the
/// reconciler), Send + Sync, and synchronous. Implementations share internal
/// state via Arc, so clones access the same underlying ledger.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Record that `record.invitee` joined because of `record.inviter`.
    ///
    /// # Invariants
    ///
    /// - If a record already exists for (community, invitee) nothing is
    ///   written and the outcome has `is_new_attribution == false`, naming
    ///   the existing inviter and its unchanged count
    /// - Otherwise the record is inserted and the inviter's counter is
    ///   incremented (created at 1 if absent) in the same transaction
    fn record_join(&self, record: &AttributionRecord) -> Result<JoinOutcome, StorageError>;

    /// Record that `invitee` left `community`.
    ///
    /// Deletes the attribution record and decrements the inviter's counter,
    /// floored at zero. Returns `None` if the invitee was never attributed
    /// (joined before tracking began, or already pruned); nothing changes.
    fn record_leave(
        &self,
        community: CommunityId,
        invitee: MemberId,
    ) -> Result<Option<LeaveOutcome>, StorageError>;

    /// Stored counter for an inviter. `0` if absent.
    fn read_count(&self, community: CommunityId, inviter: MemberId) -> Result<u64, StorageError>;

    /// Attribution record for an invitee, if any.
    fn load_attribution(
        &self,
        community: CommunityId,
        invitee: MemberId,
    ) -> Result<Option<AttributionRecord>, StorageError>;

    /// All attribution records of a community, ordered by invitee.
    fn list_attributions(
        &self,
        community: CommunityId,
    ) -> Result<Vec<AttributionRecord>, StorageError>;

    /// All stored counters of a community, ordered by inviter.
    fn list_counters(&self, community: CommunityId) -> Result<Vec<CounterAggregate>, StorageError>;

    /// Communities with at least one record or counter. Order is not
    /// guaranteed.
    fn list_communities(&self) -> Result<Vec<CommunityId>, StorageError>;

    /// Delete every attribution record whose invitee is not in `members`.
    ///
    /// Counters are left untouched; run [`Storage::rebuild_counters`]
    /// afterwards. Returns the deleted records.
    fn prune_attributions(
        &self,
        community: CommunityId,
        members: &HashSet<MemberId>,
    ) -> Result<Vec<AttributionRecord>, StorageError>;

    /// Recompute every counter of the community from its attribution
    /// records, overwriting stored values.
    ///
    /// Counters with no remaining records are removed. Returns the counters
    /// whose value changed, ordered by inviter.
    fn rebuild_counters(&self, community: CommunityId) -> Result<Vec<CountCorrection>, StorageError>;
}

/// Counters whose stored value differs from the recomputed one.
///
/// An inviter missing from either map counts as zero there.
pub(crate) fn counter_corrections(
    stored: &BTreeMap<MemberId, u64>,
    actual: &BTreeMap<MemberId, u64>,
) -> Vec<CountCorrection> {
    let inviters: std::collections::BTreeSet<MemberId> =
        stored.keys().chain(actual.keys()).copied().collect();

    inviters
        .into_iter()
        .filter_map(|inviter| {
            let stored = stored.get(&inviter).copied().unwrap_or(0);
            let actual = actual.get(&inviter).copied().unwrap_or(0);
            (stored != actual).then_some(CountCorrection { inviter, stored, actual })
        })
        .collect()
}
