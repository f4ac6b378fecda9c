//! Property tests for the attribution resolver.
//!
//! These tests verify invariants over arbitrary invite sets:
//! - A single usage increase is always the resolved invite
//! - A single unseen code is resolved when no usage increased
//! - Unchanged snapshots never resolve
//! - A usage increase beats any number of unseen codes
//! - Platform ordering of invites does not affect the result

use invitrack_core::{InviteSet, InviteSnapshot, MemberId, Resolution, resolve};
use proptest::prelude::*;

/// Invites with unique codes `c0..cN`.
fn invites() -> impl Strategy<Value = Vec<InviteSnapshot>> {
    prop::collection::vec((0u64..1_000, 1u64..100), 1..30).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (uses, inviter))| InviteSnapshot::new(format!("c{i}"), uses, MemberId(inviter)))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: exactly one code's uses increased, so that code is returned
    #[test]
    fn prop_single_increase_resolves(
        base in invites(),
        pick in any::<prop::sample::Index>(),
        delta in 1u64..5,
    ) {
        let idx = pick.index(base.len());
        let old = InviteSet::new(base.clone());

        let mut bumped = base.clone();
        bumped[idx].uses += delta;
        let new = InviteSet::new(bumped);

        let used = resolve(&old, &new).expect("increase must resolve");
        prop_assert_eq!(&used.code, &base[idx].code);
        prop_assert_eq!(used.inviter, base[idx].inviter);
        let is_increase = matches!(used.resolution, Resolution::UsageIncreased { .. });
        prop_assert!(is_increase);
    }

    /// Property: no usage increase and one new code, so the new code is returned
    #[test]
    fn prop_single_new_code_resolves(
        base in invites(),
        uses in 0u64..10,
        inviter in 1u64..100,
    ) {
        let old = InviteSet::new(base.clone());

        let mut grown = base;
        grown.push(InviteSnapshot::new("fresh", uses, MemberId(inviter)));
        let new = InviteSet::new(grown);

        let used = resolve(&old, &new).expect("new code must resolve");
        prop_assert_eq!(used.code.as_str(), "fresh");
        prop_assert_eq!(used.resolution, Resolution::NewlySeen);
    }

    /// Property: identical snapshots never resolve
    #[test]
    fn prop_no_change_resolves_nothing(base in invites()) {
        let old = InviteSet::new(base.clone());
        let new = InviteSet::new(base);

        prop_assert_eq!(resolve(&old, &new), None);
    }

    /// Property: a usage increase wins over unseen codes
    #[test]
    fn prop_increase_beats_new_codes(
        base in invites(),
        pick in any::<prop::sample::Index>(),
        extra in 1usize..5,
    ) {
        let idx = pick.index(base.len());
        let old = InviteSet::new(base.clone());

        let mut next = base.clone();
        next[idx].uses += 1;
        for i in 0..extra {
            next.push(InviteSnapshot::new(format!("new{i}"), 1, MemberId(500)));
        }
        let new = InviteSet::new(next);

        let used = resolve(&old, &new).expect("increase must resolve");
        prop_assert_eq!(&used.code, &base[idx].code);
    }

    /// Property: the order the platform lists invites in is irrelevant
    #[test]
    fn prop_order_independent(
        base in invites(),
        pick in any::<prop::sample::Index>(),
    ) {
        let idx = pick.index(base.len());
        let old = InviteSet::new(base.clone());

        let mut next = base;
        next[idx].uses += 1;
        let forward = InviteSet::new(next.clone());
        next.reverse();
        let backward = InviteSet::new(next);

        prop_assert_eq!(resolve(&old, &forward), resolve(&old, &backward));
    }

    /// Property: removing invites alone never resolves
    #[test]
    fn prop_deletions_resolve_nothing(
        base in invites(),
        pick in any::<prop::sample::Index>(),
    ) {
        let idx = pick.index(base.len());
        let old = InviteSet::new(base.clone());

        let mut shrunk = base;
        shrunk.remove(idx);
        let new = InviteSet::new(shrunk);

        prop_assert_eq!(resolve(&old, &new), None);
    }
}
