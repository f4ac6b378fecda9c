//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::BTreeSet;

use invitrack_core::MemberId;

use super::{Invariant, InvariantKind, InvariantResult, LedgerSnapshot, Violation};

/// Every stored counter equals the number of attribution records naming
/// that inviter.
///
/// Joins and leaves update record and counter in one transaction, so any
/// difference means a partial write leaked out of the ledger.
pub struct CountMatchesAttributions;

impl Invariant for CountMatchesAttributions {
    fn kind(&self) -> InvariantKind {
        InvariantKind::CountMatchesAttributions
    }

    fn check(&self, state: &LedgerSnapshot) -> InvariantResult {
        for (community_id, community) in &state.communities {
            let inviters: BTreeSet<MemberId> = community
                .counters
                .keys()
                .chain(community.attributions.values())
                .copied()
                .collect();

            for inviter in inviters {
                let stored = community.count(inviter);
                let records = community.records_for(inviter);
                if stored != records {
                    return Err(Violation {
                        invariant: self.kind(),
                        message: format!(
                            "community {community_id} inviter {inviter}: stored {stored}, records {records}"
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Every attributed invitee is a current member.
///
/// Only holds right after reconciliation: a departure missed while offline
/// leaves its record behind until the next pass. Communities captured
/// without a platform are skipped.
pub struct AttributedMembersPresent;

impl Invariant for AttributedMembersPresent {
    fn kind(&self) -> InvariantKind {
        InvariantKind::AttributedMembersPresent
    }

    fn check(&self, state: &LedgerSnapshot) -> InvariantResult {
        for (community_id, community) in &state.communities {
            let Some(members) = &community.members else {
                continue;
            };

            let absent: Vec<_> =
                community.attributions.keys().filter(|invitee| !members.contains(invitee)).collect();
            if !absent.is_empty() {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!(
                        "community {community_id}: attributed invitees {absent:?} are not members"
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The privilege is held by exactly the inviters whose count is at or above
/// the threshold.
///
/// Holds as long as every platform call succeeds. A failed grant is repaired
/// by the next reconciliation; a failed revoke only by the next crossing or a
/// count correction, so tests that inject revoke failures must not register
/// it. Communities captured without a platform are skipped.
pub struct PrivilegeMatchesThreshold;

impl Invariant for PrivilegeMatchesThreshold {
    fn kind(&self) -> InvariantKind {
        InvariantKind::PrivilegeMatchesThreshold
    }

    fn check(&self, state: &LedgerSnapshot) -> InvariantResult {
        let threshold = state.threshold.get();

        for (community_id, community) in &state.communities {
            let Some(privileged) = &community.privileged else {
                continue;
            };

            let eligible: BTreeSet<MemberId> = community
                .counters
                .iter()
                .filter(|&(_, &count)| count >= threshold)
                .map(|(&inviter, _)| inviter)
                .collect();

            if &eligible != privileged {
                let missing: Vec<_> = eligible.difference(privileged).collect();
                let extra: Vec<_> = privileged.difference(&eligible).collect();
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!(
                        "community {community_id} (threshold {threshold}): not granted {missing:?}, not revoked {extra:?}"
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use invitrack_core::{CommunityId, Threshold};

    use super::*;
    use crate::invariants::CommunitySnapshot;

    fn snapshot(community: CommunitySnapshot) -> LedgerSnapshot {
        LedgerSnapshot {
            threshold: Threshold::new(2).unwrap(),
            communities: BTreeMap::from([(CommunityId(1), community)]),
        }
    }

    #[test]
    fn drifted_counter_is_caught() {
        let state = snapshot(CommunitySnapshot {
            attributions: BTreeMap::from([(MemberId(10), MemberId(7))]),
            counters: BTreeMap::from([(MemberId(7), 2)]),
            ..CommunitySnapshot::default()
        });

        let violation = CountMatchesAttributions.check(&state).unwrap_err();
        assert_eq!(violation.invariant, InvariantKind::CountMatchesAttributions);
    }

    #[test]
    fn record_without_counter_is_caught() {
        let state = snapshot(CommunitySnapshot {
            attributions: BTreeMap::from([(MemberId(10), MemberId(7))]),
            ..CommunitySnapshot::default()
        });

        assert!(CountMatchesAttributions.check(&state).is_err());
    }

    #[test]
    fn departed_invitee_is_caught() {
        let state = snapshot(CommunitySnapshot {
            attributions: BTreeMap::from([(MemberId(10), MemberId(7))]),
            counters: BTreeMap::from([(MemberId(7), 1)]),
            members: Some(BTreeSet::from([MemberId(7)])),
            privileged: Some(BTreeSet::new()),
        });

        assert!(AttributedMembersPresent.check(&state).is_err());
        assert!(PrivilegeMatchesThreshold.check(&state).is_ok());
    }

    #[test]
    fn missing_grant_is_caught() {
        let state = snapshot(CommunitySnapshot {
            counters: BTreeMap::from([(MemberId(7), 2), (MemberId(8), 1)]),
            privileged: Some(BTreeSet::from([MemberId(8)])),
            ..CommunitySnapshot::default()
        });

        let violation = PrivilegeMatchesThreshold.check(&state).unwrap_err();
        assert!(violation.message.contains("not granted [MemberId(7)]"));
        assert!(violation.message.contains("not revoked [MemberId(8)]"));
    }
}
