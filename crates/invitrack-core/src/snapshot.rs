//! Invite-usage snapshots.
//!
//! An [`InviteSet`] is the captured state of every invite in one community at
//! one moment. Sets are immutable: a refresh builds a new set and swaps it in
//! whole, so a reader holding the previous set never sees a torn mix of old
//! and new counters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::MemberId;

/// One invite as observed on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteSnapshot {
    /// Invite code (the shareable part of the link).
    pub code: String,
    /// Number of times the invite has been used.
    pub uses: u64,
    /// Member who created the invite. `None` for vanity or widget invites.
    pub inviter: Option<MemberId>,
}

impl InviteSnapshot {
    /// Snapshot of an invite owned by `inviter`.
    pub fn new(code: impl Into<String>, uses: u64, inviter: MemberId) -> Self {
        Self { code: code.into(), uses, inviter: Some(inviter) }
    }

    /// Snapshot of an invite with no owning member.
    pub fn unowned(code: impl Into<String>, uses: u64) -> Self {
        Self { code: code.into(), uses, inviter: None }
    }
}

/// All invites of a community, keyed and ordered by code.
///
/// Ordering by code makes resolution deterministic when the platform returns
/// invites in arbitrary order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteSet {
    invites: BTreeMap<String, InviteSnapshot>,
}

impl InviteSet {
    /// Build a set from live invites. A repeated code keeps the last entry.
    pub fn new(invites: impl IntoIterator<Item = InviteSnapshot>) -> Self {
        invites.into_iter().collect()
    }

    /// Look up an invite by code.
    pub fn get(&self, code: &str) -> Option<&InviteSnapshot> {
        self.invites.get(code)
    }

    /// Whether the set contains `code`.
    pub fn contains(&self, code: &str) -> bool {
        self.invites.contains_key(code)
    }

    /// Invites in code order.
    pub fn iter(&self) -> impl Iterator<Item = &InviteSnapshot> {
        self.invites.values()
    }

    /// Number of invites.
    pub fn len(&self) -> usize {
        self.invites.len()
    }

    /// Whether the community has no invites.
    pub fn is_empty(&self) -> bool {
        self.invites.is_empty()
    }
}

impl FromIterator<InviteSnapshot> for InviteSet {
    fn from_iter<T: IntoIterator<Item = InviteSnapshot>>(iter: T) -> Self {
        let invites = iter.into_iter().map(|invite| (invite.code.clone(), invite)).collect();
        Self { invites }
    }
}

impl<'a> IntoIterator for &'a InviteSet {
    type Item = &'a InviteSnapshot;
    type IntoIter = std::collections::btree_map::Values<'a, String, InviteSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.invites.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_in_code_order() {
        let set = InviteSet::new([
            InviteSnapshot::new("zeta", 1, MemberId(1)),
            InviteSnapshot::new("alpha", 2, MemberId(2)),
            InviteSnapshot::unowned("mid", 0),
        ]);

        let codes: Vec<&str> = set.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn repeated_code_keeps_last() {
        let set = InviteSet::new([
            InviteSnapshot::new("abc", 1, MemberId(1)),
            InviteSnapshot::new("abc", 5, MemberId(1)),
        ]);

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("abc").map(|i| i.uses), Some(5));
    }

    #[test]
    fn empty_set() {
        let set = InviteSet::default();
        assert!(set.is_empty());
        assert!(!set.contains("abc"));
    }
}
