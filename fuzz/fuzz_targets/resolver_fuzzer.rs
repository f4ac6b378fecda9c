//! Fuzz target for the attribution resolver
//!
//! Builds two arbitrary invite snapshots and checks the resolver's contract.
//!
//! # Invariants
//!
//! - `resolve` NEVER panics, whatever the snapshots contain
//! - A usage increase always wins over a newly seen code
//! - The returned invite exists in the new snapshot with the reported uses
//! - Identical snapshots never resolve to anything

#![no_main]

use arbitrary::Arbitrary;
use invitrack_core::{InviteSet, InviteSnapshot, MemberId, Resolution, resolve};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInvite {
    /// Small code space so old and new snapshots overlap
    code: u8,
    uses: u16,
    owner: Option<u8>,
}

impl FuzzInvite {
    fn snapshot(&self) -> InviteSnapshot {
        InviteSnapshot {
            code: format!("c{}", self.code % 16),
            uses: u64::from(self.uses),
            inviter: self.owner.map(|o| MemberId(u64::from(o))),
        }
    }
}

fn build(invites: &[FuzzInvite]) -> InviteSet {
    invites.iter().map(FuzzInvite::snapshot).collect()
}

fuzz_target!(|input: (Vec<FuzzInvite>, Vec<FuzzInvite>)| {
    let old = build(&input.0);
    let new = build(&input.1);

    assert!(resolve(&new, &new).is_none(), "identical snapshots resolved");

    let Some(used) = resolve(&old, &new) else {
        // Nothing grew and nothing is new
        for invite in &new {
            let previous = old.get(&invite.code);
            assert!(previous.is_some_and(|p| p.uses >= invite.uses));
        }
        return;
    };

    let current = new.get(&used.code).expect("resolved code missing from new snapshot");
    assert_eq!(current.uses, used.uses);
    assert_eq!(current.inviter, used.inviter);

    let any_grew = new.iter().any(|i| old.get(&i.code).is_some_and(|p| i.uses > p.uses));
    match used.resolution {
        Resolution::UsageIncreased { previous_uses } => {
            assert!(used.uses > previous_uses);
        },
        Resolution::NewlySeen => {
            assert!(!any_grew, "newly seen code chosen over a usage increase");
            assert!(!old.contains(&used.code));
        },
    }
});
