//! Redb-backed durable ledger.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Each
//! trait method runs in exactly one transaction, and Redb serializes write
//! transactions, so a counter update can never interleave with another.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt::Display,
    path::Path,
    sync::Arc,
};

use invitrack_core::{
    AttributionRecord, CommunityId, CountCorrection, CounterAggregate, JoinOutcome, LeaveOutcome,
    MemberId,
};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use super::{Storage, StorageError, counter_corrections};

/// Table: attributions
/// Key: (community, invitee) as big-endian bytes [16 bytes]
/// Value: CBOR-encoded `StoredAttribution`
const ATTRIBUTIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("attributions");

/// Table: counters
/// Key: (community, inviter) as big-endian bytes [16 bytes]
/// Value: count
const COUNTERS: TableDefinition<&[u8], u64> = TableDefinition::new("counters");

/// Attribution value as persisted. The key carries community and invitee.
#[derive(Serialize, Deserialize)]
struct StoredAttribution {
    inviter: MemberId,
    invite_code: Option<String>,
    attributed_at_secs: u64,
}

impl StoredAttribution {
    fn from_record(record: &AttributionRecord) -> Self {
        Self {
            inviter: record.inviter,
            invite_code: record.invite_code.clone(),
            attributed_at_secs: record.attributed_at_secs,
        }
    }

    fn into_record(self, community: CommunityId, invitee: MemberId) -> AttributionRecord {
        AttributionRecord {
            community,
            invitee,
            inviter: self.inviter,
            invite_code: self.invite_code,
            attributed_at_secs: self.attributed_at_secs,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, StorageError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the `attributions` and `counters` tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(ATTRIBUTIONS).map_err(io)?;
            let _ = txn.open_table(COUNTERS).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Storage for RedbStorage {
    fn record_join(&self, record: &AttributionRecord) -> Result<JoinOutcome, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;

        let outcome = {
            let mut attributions = txn.open_table(ATTRIBUTIONS).map_err(io)?;
            let mut counters = txn.open_table(COUNTERS).map_err(io)?;

            let record_key = encode_key(record.community, record.invitee);
            let existing = attributions
                .get(record_key.as_slice())
                .map_err(io)?
                .map(|value| StoredAttribution::decode(value.value()))
                .transpose()?;

            if let Some(existing) = existing {
                let counter_key = encode_key(record.community, existing.inviter);
                let count = counters.get(counter_key.as_slice()).map_err(io)?.map_or(0, |v| v.value());

                // Nothing written; dropping the transaction aborts it
                return Ok(JoinOutcome {
                    inviter: existing.inviter,
                    is_new_attribution: false,
                    previous_count: count,
                    count,
                });
            }

            let bytes = StoredAttribution::from_record(record).encode()?;
            attributions.insert(record_key.as_slice(), bytes.as_slice()).map_err(io)?;

            let counter_key = encode_key(record.community, record.inviter);
            let previous_count =
                counters.get(counter_key.as_slice()).map_err(io)?.map_or(0, |v| v.value());
            let count = previous_count.saturating_add(1);
            counters.insert(counter_key.as_slice(), count).map_err(io)?;

            JoinOutcome { inviter: record.inviter, is_new_attribution: true, previous_count, count }
        };

        txn.commit().map_err(io)?;

        Ok(outcome)
    }

    fn record_leave(
        &self,
        community: CommunityId,
        invitee: MemberId,
    ) -> Result<Option<LeaveOutcome>, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;

        let outcome = {
            let mut attributions = txn.open_table(ATTRIBUTIONS).map_err(io)?;
            let mut counters = txn.open_table(COUNTERS).map_err(io)?;

            let record_key = encode_key(community, invitee);
            let removed = attributions
                .remove(record_key.as_slice())
                .map_err(io)?
                .map(|value| StoredAttribution::decode(value.value()))
                .transpose()?;

            let Some(removed) = removed else {
                return Ok(None);
            };

            let counter_key = encode_key(community, removed.inviter);
            let previous_count =
                counters.get(counter_key.as_slice()).map_err(io)?.map_or(0, |v| v.value());
            let count = previous_count.saturating_sub(1);
            counters.insert(counter_key.as_slice(), count).map_err(io)?;

            LeaveOutcome { inviter: removed.inviter, previous_count, count }
        };

        txn.commit().map_err(io)?;

        Ok(Some(outcome))
    }

    fn read_count(&self, community: CommunityId, inviter: MemberId) -> Result<u64, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(COUNTERS).map_err(io)?;

        let key = encode_key(community, inviter);
        Ok(table.get(key.as_slice()).map_err(io)?.map_or(0, |v| v.value()))
    }

    fn load_attribution(
        &self,
        community: CommunityId,
        invitee: MemberId,
    ) -> Result<Option<AttributionRecord>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(ATTRIBUTIONS).map_err(io)?;

        let key = encode_key(community, invitee);
        match table.get(key.as_slice()).map_err(io)? {
            Some(value) => {
                let stored = StoredAttribution::decode(value.value())?;
                Ok(Some(stored.into_record(community, invitee)))
            },
            None => Ok(None),
        }
    }

    fn list_attributions(
        &self,
        community: CommunityId,
    ) -> Result<Vec<AttributionRecord>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(ATTRIBUTIONS).map_err(io)?;

        let (start, end) = community_bounds(community);
        let mut records = Vec::new();
        for result in table.range(start.as_slice()..=end.as_slice()).map_err(io)? {
            let (key, value) = result.map_err(io)?;
            let (_, invitee) = decode_key(key.value())?;
            let stored = StoredAttribution::decode(value.value())?;
            records.push(stored.into_record(community, invitee));
        }

        Ok(records)
    }

    fn list_counters(&self, community: CommunityId) -> Result<Vec<CounterAggregate>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(COUNTERS).map_err(io)?;

        let (start, end) = community_bounds(community);
        let mut counters = Vec::new();
        for result in table.range(start.as_slice()..=end.as_slice()).map_err(io)? {
            let (key, value) = result.map_err(io)?;
            let (_, inviter) = decode_key(key.value())?;
            counters.push(CounterAggregate { community, inviter, count: value.value() });
        }

        Ok(counters)
    }

    fn list_communities(&self) -> Result<Vec<CommunityId>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let attributions = txn.open_table(ATTRIBUTIONS).map_err(io)?;
        let counters = txn.open_table(COUNTERS).map_err(io)?;

        let mut communities = BTreeSet::new();
        for result in attributions.iter().map_err(io)? {
            let (key, _) = result.map_err(io)?;
            communities.insert(decode_key(key.value())?.0);
        }
        for result in counters.iter().map_err(io)? {
            let (key, _) = result.map_err(io)?;
            communities.insert(decode_key(key.value())?.0);
        }

        Ok(communities.into_iter().collect())
    }

    fn prune_attributions(
        &self,
        community: CommunityId,
        members: &HashSet<MemberId>,
    ) -> Result<Vec<AttributionRecord>, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;

        let pruned = {
            let mut table = txn.open_table(ATTRIBUTIONS).map_err(io)?;

            let (start, end) = community_bounds(community);
            let mut pruned = Vec::new();
            for result in table.range(start.as_slice()..=end.as_slice()).map_err(io)? {
                let (key, value) = result.map_err(io)?;
                let (_, invitee) = decode_key(key.value())?;
                if !members.contains(&invitee) {
                    let stored = StoredAttribution::decode(value.value())?;
                    pruned.push(stored.into_record(community, invitee));
                }
            }

            for record in &pruned {
                let key = encode_key(community, record.invitee);
                table.remove(key.as_slice()).map_err(io)?;
            }

            pruned
        };

        txn.commit().map_err(io)?;

        Ok(pruned)
    }

    fn rebuild_counters(&self, community: CommunityId) -> Result<Vec<CountCorrection>, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;

        let corrections = {
            let attributions = txn.open_table(ATTRIBUTIONS).map_err(io)?;
            let mut counters = txn.open_table(COUNTERS).map_err(io)?;
            let (start, end) = community_bounds(community);

            let mut actual: BTreeMap<MemberId, u64> = BTreeMap::new();
            for result in attributions.range(start.as_slice()..=end.as_slice()).map_err(io)? {
                let (_, value) = result.map_err(io)?;
                let stored = StoredAttribution::decode(value.value())?;
                *actual.entry(stored.inviter).or_insert(0) += 1;
            }

            let mut stored: BTreeMap<MemberId, u64> = BTreeMap::new();
            for result in counters.range(start.as_slice()..=end.as_slice()).map_err(io)? {
                let (key, value) = result.map_err(io)?;
                let (_, inviter) = decode_key(key.value())?;
                stored.insert(inviter, value.value());
            }

            let corrections = counter_corrections(&stored, &actual);

            for inviter in stored.keys() {
                if !actual.contains_key(inviter) {
                    let key = encode_key(community, *inviter);
                    counters.remove(key.as_slice()).map_err(io)?;
                }
            }
            for (inviter, count) in &actual {
                let key = encode_key(community, *inviter);
                counters.insert(key.as_slice(), *count).map_err(io)?;
            }

            corrections
        };

        txn.commit().map_err(io)?;

        Ok(corrections)
    }
}

fn io<E: Display>(e: E) -> StorageError {
    StorageError::Io(e.to_string())
}

/// Encode (community, member) as a 16-byte big-endian key.
///
/// Layout: [community: 8 bytes BE][member: 8 bytes BE]
/// Lexicographic order matches numeric order, so one community is one range.
fn encode_key(community: CommunityId, member: MemberId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&community.get().to_be_bytes());
    key[8..].copy_from_slice(&member.get().to_be_bytes());
    key
}

/// Decode a key back to (community, member).
fn decode_key(key: &[u8]) -> Result<(CommunityId, MemberId), StorageError> {
    let bytes: [u8; 16] = key
        .try_into()
        .map_err(|_| StorageError::Corrupt(format!("key is {} bytes, expected 16", key.len())))?;

    let (community, member) = bytes.split_at(8);
    let community = u64::from_be_bytes(community.try_into().map_err(|_| corrupt_key())?);
    let member = u64::from_be_bytes(member.try_into().map_err(|_| corrupt_key())?);
    Ok((CommunityId(community), MemberId(member)))
}

fn corrupt_key() -> StorageError {
    StorageError::Corrupt("malformed ledger key".to_string())
}

fn community_bounds(community: CommunityId) -> ([u8; 16], [u8; 16]) {
    (encode_key(community, MemberId(0)), encode_key(community, MemberId(u64::MAX)))
}
