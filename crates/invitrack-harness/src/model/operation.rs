//! Operations for model-based testing.
//!
//! Operations represent everything that can happen to one community: invites
//! created, members joining and leaving, events redelivered or lost, and
//! reconciliation passes. They are generated randomly (by proptest through
//! `arbitrary`, or by the seeded scenario generator) and applied to both the
//! model and the real engine.

use arbitrary::Arbitrary;

/// Invitee slot. Mapped onto a small member pool so joins, leaves and
/// rejoins of the same member are common.
pub type ModelMember = u8;

/// Inviter slot, mapped onto a pool disjoint from invitees.
pub type ModelInviter = u8;

/// Index into the invites created so far.
pub type InviteSlot = u8;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// An inviter creates a fresh invite with no uses.
    CreateInvite {
        /// Owner of the invite.
        owner: ModelInviter,
    },

    /// A moderator creates an invite with no owning member.
    CreateUnownedInvite,

    /// A non-member joins through an existing invite.
    Join {
        /// Member joining.
        member: ModelMember,
        /// Invite used.
        invite: InviteSlot,
    },

    /// A non-member joins through the vanity URL; no counter moves.
    VanityJoin {
        /// Member joining.
        member: ModelMember,
    },

    /// The platform delivers the join event of a current member again.
    RedeliverJoin {
        /// Member whose join is redelivered.
        member: ModelMember,
    },

    /// A member leaves and the leave event is delivered.
    Leave {
        /// Member leaving.
        member: ModelMember,
    },

    /// A member leaves while the engine is offline; no event is delivered.
    SilentLeave {
        /// Member leaving.
        member: ModelMember,
    },

    /// Reconcile the community against its member list.
    Reconcile,
}

/// Human-readable operation label for failure messages.
impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateInvite { owner } => write!(f, "create-invite(owner={owner})"),
            Self::CreateUnownedInvite => f.write_str("create-unowned-invite"),
            Self::Join { member, invite } => write!(f, "join(member={member}, invite={invite})"),
            Self::VanityJoin { member } => write!(f, "vanity-join(member={member})"),
            Self::RedeliverJoin { member } => write!(f, "redeliver-join(member={member})"),
            Self::Leave { member } => write!(f, "leave(member={member})"),
            Self::SilentLeave { member } => write!(f, "silent-leave(member={member})"),
            Self::Reconcile => f.write_str("reconcile"),
        }
    }
}
