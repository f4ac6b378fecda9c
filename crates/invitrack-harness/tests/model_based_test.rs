//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! engine behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelWorld    Engine + SimPlatform  Compare
//!      (reference)   (paused clock)        outcomes, ledger, privileges
//! ```

use std::future::Future;

use arbitrary::{Arbitrary, Unstructured};
use invitrack_core::Threshold;
use invitrack_harness::{
    ModelStep, ModelWorld, Operation, SimDriver,
    model::{INVITERS, InviteSlot, MEMBERS},
};
use invitrack_server::{MemoryStorage, RedbStorage};
use proptest::prelude::*;
use tempfile::tempdir;

/// Run `future` on a fresh current-thread runtime with a paused clock.
fn block_on_paused<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime build failed")
        .block_on(future)
}

/// Strategy for generating operations.
fn operation_strategy() -> impl Strategy<Value = Operation> {
    let member = 0..MEMBERS;
    let owner = 0..INVITERS;
    let invite = any::<InviteSlot>();

    prop_oneof![
        // Weight towards joins so inviters actually reach the threshold
        2 => owner.prop_map(|owner| Operation::CreateInvite { owner }),
        1 => Just(Operation::CreateUnownedInvite),
        8 => (member.clone(), invite).prop_map(|(member, invite)| Operation::Join { member, invite }),
        1 => member.clone().prop_map(|member| Operation::VanityJoin { member }),
        1 => member.clone().prop_map(|member| Operation::RedeliverJoin { member }),
        3 => member.clone().prop_map(|member| Operation::Leave { member }),
        1 => member.prop_map(|member| Operation::SilentLeave { member }),
        1 => Just(Operation::Reconcile),
    ]
}

fn threshold_strategy() -> impl Strategy<Value = Threshold> {
    (1u64..5).prop_map(|t| Threshold::new(t).expect("non-zero threshold"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: The engine reports what the model predicts for every event,
    /// and ledger and privileges match the model after every step
    #[test]
    fn prop_engine_matches_model(
        threshold in threshold_strategy(),
        ops in prop::collection::vec(operation_strategy(), 0..150),
    ) {
        let result = block_on_paused(async {
            let mut driver = SimDriver::new(MemoryStorage::new(), threshold).await?;
            driver.run(&ops).await
        });
        prop_assert!(result.is_ok(), "{}", result.unwrap_err());
    }

    /// Property: A reconciliation right after another never changes anything
    #[test]
    fn prop_reconcile_is_idempotent(
        threshold in threshold_strategy(),
        ops in prop::collection::vec(operation_strategy(), 0..80),
    ) {
        let second = block_on_paused(async {
            let mut driver = SimDriver::new(MemoryStorage::new(), threshold).await?;
            driver.run(&ops).await?;
            driver.apply(&Operation::Reconcile).await?;
            driver.apply(&Operation::Reconcile).await
        });

        match second {
            Ok(ModelStep::Reconciled { pruned, corrections }) => {
                prop_assert!(pruned.is_empty());
                prop_assert!(corrections.is_empty());
            },
            Ok(step) => prop_assert!(false, "unexpected step {:?}", step),
            Err(e) => prop_assert!(false, "{}", e),
        }
    }

    /// Property: Model privileges are exactly the inviters at or above the
    /// threshold, and every attributed invitee is a member or awaiting prune
    #[test]
    fn prop_model_invariants(
        threshold in threshold_strategy(),
        ops in prop::collection::vec(operation_strategy(), 0..200),
    ) {
        let mut model = ModelWorld::new(threshold);
        let mut silently_left = std::collections::BTreeSet::new();

        for op in &ops {
            match model.apply(op) {
                ModelStep::LeftSilently { member } => {
                    silently_left.insert(member);
                },
                ModelStep::Joined { member, .. } => {
                    silently_left.remove(&member);
                },
                ModelStep::Reconciled { .. } => silently_left.clear(),
                _ => {},
            }
        }

        for (invitee, inviter) in model.attributions() {
            prop_assert!(
                model.members().contains(invitee) || silently_left.contains(invitee),
                "invitee {} of {} vanished without a leave", invitee, inviter
            );
        }
        for inviter in model.privileged() {
            prop_assert!(model.count(inviter) >= threshold.get());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Property: The durable backend behaves like the in-memory one
    #[test]
    fn prop_redb_engine_matches_model(
        threshold in threshold_strategy(),
        ops in prop::collection::vec(operation_strategy(), 0..60),
    ) {
        let dir = tempdir().expect("tempdir failed");
        let storage = RedbStorage::open(dir.path().join("ledger.redb")).expect("open failed");

        let result = block_on_paused(async {
            let mut driver = SimDriver::new(storage, threshold).await?;
            driver.run(&ops).await
        });
        prop_assert!(result.is_ok(), "{}", result.unwrap_err());
    }

    /// Property: Operations decoded from raw bytes (the fuzzer's input
    /// format) also match the model
    #[test]
    fn prop_arbitrary_bytes_match_model(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut input = Unstructured::new(&bytes);
        let ops = Vec::<Operation>::arbitrary(&mut input).unwrap_or_default();

        let result = block_on_paused(async {
            let mut driver = SimDriver::new(MemoryStorage::new(), Threshold::default()).await?;
            driver.run(&ops).await
        });
        prop_assert!(result.is_ok(), "{}", result.unwrap_err());
    }
}

#[test]
fn model_basic_operations() {
    let threshold = Threshold::new(2).unwrap();
    let ops = [
        Operation::CreateInvite { owner: 0 },
        Operation::CreateInvite { owner: 1 },
        Operation::Join { member: 1, invite: 0 },
        Operation::Join { member: 2, invite: 1 },
        Operation::Join { member: 3, invite: 0 },
        Operation::RedeliverJoin { member: 3 },
        Operation::VanityJoin { member: 4 },
        Operation::Leave { member: 1 },
        Operation::SilentLeave { member: 3 },
        Operation::Reconcile,
        Operation::Join { member: 3, invite: 1 },
    ];

    let driver = block_on_paused(async {
        let mut driver = SimDriver::new(MemoryStorage::new(), threshold).await.unwrap();
        driver.run(&ops).await.unwrap();
        driver
    });

    let world = driver.world();
    assert_eq!(world.count(ModelWorld::inviter(0)), 0);
    assert_eq!(world.count(ModelWorld::inviter(1)), 2);
    assert_eq!(world.privileged().len(), 1);
    assert_eq!(driver.steps(), ops.len());
}
