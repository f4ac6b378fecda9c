//! Fuzz target for the counter ledger under storage failures
//!
//! Applies arbitrary joins, leaves and reconciliation passes through
//! `ChaoticStorage` and inspects the inner ledger after each one.
//!
//! # Strategy
//!
//! - Variable failure rates (0% to 90%)
//! - Joins and leaves interleaved across two communities
//! - Reconciliation against arbitrary member lists
//!
//! # Invariants
//!
//! - The ledger NEVER panics on storage errors
//! - Joins and leaves are atomic: they never change a counter's drift
//! - A clean reconciliation always leaves counters equal to records

#![no_main]

use std::collections::{BTreeMap, HashSet};

use arbitrary::Arbitrary;
use invitrack_core::{AttributionRecord, CommunityId, MemberId};
use invitrack_server::{
    reconcile::{detect_drift, reconcile_ledger},
    storage::{ChaoticStorage, MemoryStorage, Storage},
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct ChaosScenario {
    /// Seed for ChaoticStorage RNG (deterministic failures)
    chaos_seed: u64,
    /// Failure rate 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    operations: Vec<LedgerOperation>,
}

#[derive(Debug, Clone, Arbitrary)]
enum LedgerOperation {
    Join { community: bool, invitee: u8, inviter: u8 },
    Leave { community: bool, invitee: u8 },
    Reconcile { community: bool, members: Vec<u8> },
}

fn community(second: bool) -> CommunityId {
    if second { CommunityId(2) } else { CommunityId(1) }
}

fn drift(storage: &MemoryStorage, community: CommunityId) -> BTreeMap<MemberId, i64> {
    detect_drift(storage, community)
        .expect("inner storage never fails")
        .into_iter()
        .map(|c| (c.inviter, c.stored as i64 - c.actual as i64))
        .collect()
}

fuzz_target!(|scenario: ChaosScenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let inner = MemoryStorage::new();
    let storage = ChaoticStorage::with_seed(inner.clone(), failure_rate, scenario.chaos_seed);

    for op in scenario.operations.iter().take(256) {
        match op {
            LedgerOperation::Join { community: c, invitee, inviter } => {
                let c = community(*c);
                let before = drift(&inner, c);
                let record = AttributionRecord::new(
                    c,
                    MemberId(u64::from(*invitee)),
                    MemberId(1_000 + u64::from(*inviter % 8)),
                );
                let _ = storage.record_join(&record);
                assert_eq!(before, drift(&inner, c), "join tore the ledger");
            },
            LedgerOperation::Leave { community: c, invitee } => {
                let c = community(*c);
                let before = drift(&inner, c);
                let _ = storage.record_leave(c, MemberId(u64::from(*invitee)));
                assert_eq!(before, drift(&inner, c), "leave tore the ledger");
            },
            LedgerOperation::Reconcile { community: c, members } => {
                let members: HashSet<MemberId> =
                    members.iter().map(|&m| MemberId(u64::from(m))).collect();
                let _ = reconcile_ledger(&storage, community(*c), &members);
            },
        }
    }

    for c in [community(false), community(true)] {
        let members: HashSet<MemberId> = inner
            .list_attributions(c)
            .expect("inner storage never fails")
            .into_iter()
            .map(|record| record.invitee)
            .collect();
        reconcile_ledger(&inner, c, &members).expect("clean pass failed");
        assert!(drift(&inner, c).is_empty(), "clean reconcile left drift");
    }
});
