//! Attribution resolver.
//!
//! Diffs the snapshot taken before a join against the one taken after it and
//! picks the single invite the join consumed.
//!
//! Two tiers, in this order:
//!
//! 1. An invite present in both snapshots whose `uses` strictly increased.
//! 2. An invite present only in the new snapshot. The platform can create an
//!    invite and consume it before we ever observed it, so an unseen code
//!    counts as used once. Unseen codes that already show a use are preferred
//!    over unseen codes still at zero.
//!
//! A usage increase always wins over a newly seen code. When neither tier
//! matches the join is not attributable (vanity URL, or the counter has not
//! propagated yet), which is a normal outcome and not an error.

use crate::{
    ids::MemberId,
    snapshot::{InviteSet, InviteSnapshot},
};

/// Which tier of the resolver matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The invite's usage counter increased between the snapshots.
    UsageIncreased {
        /// Uses in the previous snapshot.
        previous_uses: u64,
    },
    /// The invite was absent from the previous snapshot.
    NewlySeen,
}

/// The invite a join is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedInvite {
    /// Invite code.
    pub code: String,
    /// Owner of the invite, if any.
    pub inviter: Option<MemberId>,
    /// Uses in the new snapshot.
    pub uses: u64,
    /// How the invite was identified.
    pub resolution: Resolution,
}

impl UsedInvite {
    fn from_snapshot(invite: &InviteSnapshot, resolution: Resolution) -> Self {
        Self { code: invite.code.clone(), inviter: invite.inviter, uses: invite.uses, resolution }
    }
}

/// Decide which invite was consumed between `old` and `new`.
///
/// Candidates within a tier are taken in code order. Only one join is
/// resolved per community at a time, so more than one candidate means the
/// platform reported several joins at once and the first is as good as any.
pub fn resolve(old: &InviteSet, new: &InviteSet) -> Option<UsedInvite> {
    let increased = new.iter().find_map(|invite| {
        let previous = old.get(&invite.code)?;
        (invite.uses > previous.uses).then(|| {
            UsedInvite::from_snapshot(
                invite,
                Resolution::UsageIncreased { previous_uses: previous.uses },
            )
        })
    });
    if increased.is_some() {
        return increased;
    }

    let mut unseen = new.iter().filter(|invite| !old.contains(&invite.code));
    let first_unseen = unseen.next()?;
    let used = std::iter::once(first_unseen)
        .chain(unseen)
        .find(|invite| invite.uses > 0)
        .unwrap_or(first_unseen);

    Some(UsedInvite::from_snapshot(used, Resolution::NewlySeen))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(invites: &[(&str, u64, u64)]) -> InviteSet {
        invites
            .iter()
            .map(|&(code, uses, inviter)| InviteSnapshot::new(code, uses, MemberId(inviter)))
            .collect()
    }

    #[test]
    fn usage_increase_is_attributed() {
        let old = set(&[("aaa", 3, 1), ("bbb", 7, 2)]);
        let new = set(&[("aaa", 3, 1), ("bbb", 8, 2)]);

        let used = resolve(&old, &new).unwrap();
        assert_eq!(used.code, "bbb");
        assert_eq!(used.inviter, Some(MemberId(2)));
        assert_eq!(used.resolution, Resolution::UsageIncreased { previous_uses: 7 });
    }

    #[test]
    fn newly_seen_invite_is_fallback() {
        let old = set(&[("aaa", 3, 1)]);
        let new = set(&[("aaa", 3, 1), ("ccc", 1, 9)]);

        let used = resolve(&old, &new).unwrap();
        assert_eq!(used.code, "ccc");
        assert_eq!(used.resolution, Resolution::NewlySeen);
    }

    #[test]
    fn usage_increase_beats_newly_seen() {
        let old = set(&[("zzz", 3, 1)]);
        let new = set(&[("aaa", 1, 2), ("zzz", 4, 1)]);

        let used = resolve(&old, &new).unwrap();
        assert_eq!(used.code, "zzz");
    }

    #[test]
    fn unseen_invite_with_uses_preferred_over_unused() {
        let old = set(&[]);
        let new = set(&[("aaa", 0, 1), ("bbb", 1, 2)]);

        assert_eq!(resolve(&old, &new).unwrap().code, "bbb");
    }

    #[test]
    fn unseen_unused_invite_still_resolves() {
        let old = set(&[("aaa", 3, 1)]);
        let new = set(&[("aaa", 3, 1), ("fresh", 0, 4)]);

        assert_eq!(resolve(&old, &new).unwrap().code, "fresh");
    }

    #[test]
    fn no_change_is_not_attributable() {
        let old = set(&[("aaa", 3, 1)]);
        assert_eq!(resolve(&old, &old.clone()), None);
    }

    #[test]
    fn deleted_invite_is_ignored() {
        let old = set(&[("aaa", 3, 1), ("gone", 9, 2)]);
        let new = set(&[("aaa", 3, 1)]);

        assert_eq!(resolve(&old, &new), None);
    }

    #[test]
    fn usage_decrease_is_ignored() {
        let old = set(&[("aaa", 5, 1)]);
        let new = set(&[("aaa", 4, 1)]);

        assert_eq!(resolve(&old, &new), None);
    }

    #[test]
    fn unowned_invite_resolves_without_inviter() {
        let old = InviteSet::new([InviteSnapshot::unowned("vanity", 10)]);
        let new = InviteSet::new([InviteSnapshot::unowned("vanity", 11)]);

        let used = resolve(&old, &new).unwrap();
        assert_eq!(used.inviter, None);
    }
}
