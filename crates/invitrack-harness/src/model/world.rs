//! Model community.
//!
//! Tracks what the platform knows (invites, members) next to what the engine
//! should know (its last invite snapshot, the attributions), and derives the
//! engine's expected answer for every operation from those plain maps.

use std::collections::{BTreeMap, BTreeSet};

use invitrack_core::{CountCorrection, MemberId, Threshold, ThresholdAction};
use invitrack_server::EventOutcome;

use super::operation::{InviteSlot, ModelInviter, ModelMember, Operation};

/// Size of the invitee pool.
pub const MEMBERS: u8 = 16;

/// Size of the inviter pool.
pub const INVITERS: u8 = 4;

/// Inviter ids start here so they never collide with invitees.
const INVITER_BASE: u64 = 1_000;

#[derive(Debug, Clone)]
struct ModelInvite {
    owner: Option<MemberId>,
    uses: u64,
}

/// What applying an operation did, and what the engine must report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStep {
    /// Preconditions were not met; nothing happens anywhere.
    Skipped,

    /// A new invite exists on the platform.
    InviteCreated {
        /// Invite code
        code: String,
        /// Invite owner, `None` for unowned invites
        owner: Option<MemberId>,
    },

    /// A member joined and the event is delivered.
    Joined {
        /// New member
        member: MemberId,
        /// Invite used, `None` for the vanity URL
        via: Option<String>,
        /// Expected engine outcome
        expected: EventOutcome,
    },

    /// A current member's join event is delivered again.
    Redelivered {
        /// Member whose join is redelivered
        member: MemberId,
        /// Expected engine outcome
        expected: EventOutcome,
    },

    /// A member left and the event is delivered.
    Left {
        /// Departed member
        member: MemberId,
        /// Expected engine outcome
        expected: EventOutcome,
    },

    /// A member left with no event.
    LeftSilently {
        /// Departed member
        member: MemberId,
    },

    /// A reconciliation pass ran.
    Reconciled {
        /// Invitees whose records were pruned
        pruned: BTreeSet<MemberId>,
        /// Counters the pass changed, ordered by inviter
        corrections: Vec<CountCorrection>,
    },
}

/// Reference model of one tracked community.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    threshold: Threshold,
    /// Invites as the platform reports them.
    invites: BTreeMap<String, ModelInvite>,
    /// Uses per code in the engine's cached snapshot.
    cached: BTreeMap<String, u64>,
    members: BTreeSet<MemberId>,
    /// Invitee to inviter.
    attributions: BTreeMap<MemberId, MemberId>,
    created: usize,
}

impl ModelWorld {
    /// Empty community whose snapshot cache is already warm.
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            invites: BTreeMap::new(),
            cached: BTreeMap::new(),
            members: BTreeSet::new(),
            attributions: BTreeMap::new(),
            created: 0,
        }
    }

    /// Threshold the model evaluates against.
    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// Member id for an invitee slot.
    pub fn member(slot: ModelMember) -> MemberId {
        MemberId(u64::from(slot % MEMBERS))
    }

    /// Member id for an inviter slot.
    pub fn inviter(slot: ModelInviter) -> MemberId {
        MemberId(INVITER_BASE + u64::from(slot % INVITERS))
    }

    /// Current members.
    pub fn members(&self) -> &BTreeSet<MemberId> {
        &self.members
    }

    /// Attributed invitees and their inviters.
    pub fn attributions(&self) -> &BTreeMap<MemberId, MemberId> {
        &self.attributions
    }

    /// Expected count for an inviter.
    pub fn count(&self, inviter: MemberId) -> u64 {
        self.attributions.values().filter(|&&i| i == inviter).count() as u64
    }

    /// Inviters that should hold the privilege.
    pub fn privileged(&self) -> BTreeSet<MemberId> {
        let inviters: BTreeSet<MemberId> = self.attributions.values().copied().collect();
        inviters.into_iter().filter(|&i| self.count(i) >= self.threshold.get()).collect()
    }

    /// Apply an operation and return the step the engine must reproduce.
    pub fn apply(&mut self, op: &Operation) -> ModelStep {
        match *op {
            Operation::CreateInvite { owner } => self.create_invite(Some(Self::inviter(owner))),
            Operation::CreateUnownedInvite => self.create_invite(None),
            Operation::Join { member, invite } => self.join(Self::member(member), invite),
            Operation::VanityJoin { member } => self.vanity_join(Self::member(member)),
            Operation::RedeliverJoin { member } => self.redeliver(Self::member(member)),
            Operation::Leave { member } => self.leave(Self::member(member)),
            Operation::SilentLeave { member } => self.silent_leave(Self::member(member)),
            Operation::Reconcile => self.reconcile(),
        }
    }

    fn create_invite(&mut self, owner: Option<MemberId>) -> ModelStep {
        let prefix = if owner.is_some() { "inv" } else { "open" };
        let code = format!("{prefix}{:04}", self.created);
        self.created += 1;
        self.invites.insert(code.clone(), ModelInvite { owner, uses: 0 });
        ModelStep::InviteCreated { code, owner }
    }

    fn join(&mut self, member: MemberId, slot: InviteSlot) -> ModelStep {
        if self.members.contains(&member) || self.invites.is_empty() {
            return ModelStep::Skipped;
        }

        let index = usize::from(slot) % self.invites.len();
        let Some((code, invite)) = self.invites.iter_mut().nth(index) else {
            return ModelStep::Skipped;
        };
        invite.uses += 1;
        let code = code.clone();

        self.members.insert(member);
        let expected = self.handle_join(member);
        ModelStep::Joined { member, via: Some(code), expected }
    }

    fn vanity_join(&mut self, member: MemberId) -> ModelStep {
        if !self.members.insert(member) {
            return ModelStep::Skipped;
        }
        let expected = self.handle_join(member);
        ModelStep::Joined { member, via: None, expected }
    }

    fn redeliver(&mut self, member: MemberId) -> ModelStep {
        if !self.members.contains(&member) {
            return ModelStep::Skipped;
        }
        let expected = self.handle_join(member);
        ModelStep::Redelivered { member, expected }
    }

    fn leave(&mut self, member: MemberId) -> ModelStep {
        if !self.members.remove(&member) {
            return ModelStep::Skipped;
        }

        let expected = match self.attributions.remove(&member) {
            Some(inviter) => {
                let count = self.count(inviter);
                let action = if count + 1 == self.threshold.get() {
                    ThresholdAction::Revoke
                } else {
                    ThresholdAction::NoOp
                };
                EventOutcome::Departed { inviter, count, action }
            },
            None => EventOutcome::Untracked,
        };
        ModelStep::Left { member, expected }
    }

    fn silent_leave(&mut self, member: MemberId) -> ModelStep {
        if !self.members.remove(&member) {
            return ModelStep::Skipped;
        }
        ModelStep::LeftSilently { member }
    }

    fn reconcile(&mut self) -> ModelStep {
        let before: BTreeMap<MemberId, u64> = self.count_by_inviter();

        let pruned: BTreeSet<MemberId> = self
            .attributions
            .keys()
            .filter(|invitee| !self.members.contains(invitee))
            .copied()
            .collect();
        self.attributions.retain(|invitee, _| !pruned.contains(invitee));

        let after = self.count_by_inviter();
        let corrections = before
            .iter()
            .filter_map(|(&inviter, &stored)| {
                let actual = after.get(&inviter).copied().unwrap_or(0);
                (stored != actual).then_some(CountCorrection { inviter, stored, actual })
            })
            .collect();

        ModelStep::Reconciled { pruned, corrections }
    }

    /// Engine join handling: duplicate check, then snapshot refresh and
    /// resolution.
    fn handle_join(&mut self, member: MemberId) -> EventOutcome {
        if let Some(&inviter) = self.attributions.get(&member) {
            return EventOutcome::DuplicateJoin { inviter, count: self.count(inviter) };
        }

        let Some((code, owner)) = self.consume_snapshot() else {
            return EventOutcome::NotAttributable;
        };
        let Some(inviter) = owner else {
            return EventOutcome::NotAttributable;
        };

        self.attributions.insert(member, inviter);
        let count = self.count(inviter);
        let action = if count == self.threshold.get() {
            ThresholdAction::Grant
        } else {
            ThresholdAction::NoOp
        };
        EventOutcome::Attributed { inviter, code, count, action }
    }

    /// Replace the cached snapshot with the live invites and pick the code
    /// the join used: the first code whose uses grew, else the first code
    /// never seen before (preferring one that already shows a use).
    fn consume_snapshot(&mut self) -> Option<(String, Option<MemberId>)> {
        let grew = self
            .invites
            .iter()
            .find(|(code, invite)| self.cached.get(*code).is_some_and(|&uses| invite.uses > uses));

        let unseen: Vec<_> =
            self.invites.iter().filter(|(code, _)| !self.cached.contains_key(*code)).collect();
        let fresh = unseen.iter().find(|(_, invite)| invite.uses > 0).or(unseen.first()).copied();

        let picked = grew.or(fresh).map(|(code, invite)| (code.clone(), invite.owner));

        self.cached = self.invites.iter().map(|(code, invite)| (code.clone(), invite.uses)).collect();
        picked
    }

    fn count_by_inviter(&self) -> BTreeMap<MemberId, u64> {
        let mut counts = BTreeMap::new();
        for inviter in self.attributions.values() {
            *counts.entry(*inviter).or_insert(0) += 1;
        }
        counts
    }
}
