//! Ledger records.
//!
//! The two durable relations (attribution records and per-inviter counters)
//! plus the outcomes ledger operations report. Storage backends live in the
//! server crate; these types are shared with the harness and the model.

use serde::{Deserialize, Serialize};

use crate::ids::{CommunityId, MemberId};

/// "`invitee` joined `community` because of `inviter`".
///
/// At most one record exists per (community, invitee).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionRecord {
    /// Community the join happened in.
    pub community: CommunityId,
    /// Member who joined.
    pub invitee: MemberId,
    /// Member credited with the join.
    pub inviter: MemberId,
    /// Invite code the join was resolved to, when known.
    pub invite_code: Option<String>,
    /// Wall-clock seconds when the attribution was recorded.
    pub attributed_at_secs: u64,
}

impl AttributionRecord {
    /// Record with no invite code or timestamp.
    pub fn new(community: CommunityId, invitee: MemberId, inviter: MemberId) -> Self {
        Self { community, invitee, inviter, invite_code: None, attributed_at_secs: 0 }
    }

    /// Attach the invite code the join was resolved to.
    #[must_use]
    pub fn with_invite_code(mut self, code: impl Into<String>) -> Self {
        self.invite_code = Some(code.into());
        self
    }

    /// Attach the attribution time.
    #[must_use]
    pub fn attributed_at(mut self, secs: u64) -> Self {
        self.attributed_at_secs = secs;
        self
    }
}

/// Number of live attributions for one inviter in one community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterAggregate {
    /// Community the counter belongs to.
    pub community: CommunityId,
    /// Inviter being counted.
    pub inviter: MemberId,
    /// Attributed invitees still present.
    pub count: u64,
}

/// Result of recording a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Inviter credited for the invitee. For a duplicate join this is the
    /// inviter of the existing record, which may differ from the one passed.
    pub inviter: MemberId,
    /// `false` when the invitee was already attributed; callers must skip
    /// side effects.
    pub is_new_attribution: bool,
    /// Counter before the operation.
    pub previous_count: u64,
    /// Counter after the operation.
    pub count: u64,
}

/// Result of recording a leave for an attributed invitee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Inviter the departed invitee was attributed to.
    pub inviter: MemberId,
    /// Counter before the decrement.
    pub previous_count: u64,
    /// Counter after the decrement, floored at zero.
    pub count: u64,
}

/// A counter that reconciliation found out of step with its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountCorrection {
    /// Inviter whose counter changed.
    pub inviter: MemberId,
    /// Value stored before the rebuild.
    pub stored: u64,
    /// Value recomputed from attribution records.
    pub actual: u64,
}
