//! Threshold controller.
//!
//! Decides, from a count transition alone, whether the inviter just became
//! eligible for the privilege or just stopped being eligible. Nothing about
//! the current privilege state is consulted: the decision is a pure function
//! of the two counts and the threshold, so replaying a transition after a
//! failed grant yields the same action again.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from threshold configuration.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdError {
    /// A threshold of zero would grant the privilege to everyone.
    #[error("threshold must be greater than zero")]
    Zero,
}

/// Number of attributed invites required for the privilege. Always `> 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Threshold(u64);

impl Threshold {
    /// Validate and wrap a threshold.
    pub const fn new(value: u64) -> Result<Self, ThresholdError> {
        if value == 0 { Err(ThresholdError::Zero) } else { Ok(Self(value)) }
    }

    /// The raw threshold.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(10)
    }
}

impl TryFrom<u64> for Threshold {
    type Error = ThresholdError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Threshold> for u64 {
    fn from(threshold: Threshold) -> Self {
        threshold.0
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which way a count moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The count increased (attribution recorded).
    Grew,
    /// The count decreased (invitee left, or drift corrected downward).
    Shrank,
}

impl Direction {
    /// Direction of the move from `old` to `new`, or `None` if unchanged.
    pub fn between(old: u64, new: u64) -> Option<Self> {
        match new.cmp(&old) {
            std::cmp::Ordering::Greater => Some(Self::Grew),
            std::cmp::Ordering::Less => Some(Self::Shrank),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Side effect requested from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrivilegeAction {
    /// Give the privilege to the inviter.
    Grant,
    /// Take the privilege away from the inviter.
    Revoke,
}

/// Result of evaluating a count transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdAction {
    /// The count crossed upward into eligibility.
    Grant,
    /// The count crossed downward out of eligibility.
    Revoke,
    /// No boundary was crossed.
    NoOp,
}

impl ThresholdAction {
    /// The privilege side effect to execute, if any.
    pub fn privilege(self) -> Option<PrivilegeAction> {
        match self {
            Self::Grant => Some(PrivilegeAction::Grant),
            Self::Revoke => Some(PrivilegeAction::Revoke),
            Self::NoOp => None,
        }
    }
}

/// Evaluate a count transition in a known direction.
///
/// - `Grant` iff `old < threshold <= new`
/// - `Revoke` iff `old >= threshold > new`
/// - `NoOp` otherwise, including when `direction` disagrees with the counts
///
/// A downward jump of several steps (reconciliation correcting drift) still
/// revokes, since only the crossing of the boundary matters.
pub fn on_count_change(
    direction: Direction,
    old: u64,
    new: u64,
    threshold: Threshold,
) -> ThresholdAction {
    let t = threshold.get();
    match direction {
        Direction::Grew if old < t && t <= new => ThresholdAction::Grant,
        Direction::Shrank if old >= t && t > new => ThresholdAction::Revoke,
        _ => ThresholdAction::NoOp,
    }
}

/// Evaluate a count transition, deriving the direction from the counts.
pub fn evaluate(old: u64, new: u64, threshold: Threshold) -> ThresholdAction {
    Direction::between(old, new)
        .map_or(ThresholdAction::NoOp, |direction| on_count_change(direction, old, new, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ten() -> Threshold {
        Threshold::new(10).unwrap()
    }

    #[test]
    fn approaching_threshold_is_noop() {
        assert_eq!(on_count_change(Direction::Grew, 8, 9, ten()), ThresholdAction::NoOp);
    }

    #[test]
    fn landing_on_threshold_grants() {
        assert_eq!(on_count_change(Direction::Grew, 9, 10, ten()), ThresholdAction::Grant);
    }

    #[test]
    fn leaving_threshold_revokes() {
        assert_eq!(on_count_change(Direction::Shrank, 10, 9, ten()), ThresholdAction::Revoke);
    }

    #[test]
    fn multi_step_drop_revokes() {
        assert_eq!(on_count_change(Direction::Shrank, 12, 7, ten()), ThresholdAction::Revoke);
    }

    #[test]
    fn above_threshold_growth_is_noop() {
        assert_eq!(on_count_change(Direction::Grew, 10, 11, ten()), ThresholdAction::NoOp);
        assert_eq!(on_count_change(Direction::Shrank, 12, 11, ten()), ThresholdAction::NoOp);
    }

    #[test]
    fn direction_mismatch_is_noop() {
        assert_eq!(on_count_change(Direction::Shrank, 9, 10, ten()), ThresholdAction::NoOp);
        assert_eq!(on_count_change(Direction::Grew, 10, 9, ten()), ThresholdAction::NoOp);
    }

    #[test]
    fn evaluate_derives_direction() {
        assert_eq!(evaluate(3, 15, ten()), ThresholdAction::Grant);
        assert_eq!(evaluate(15, 0, ten()), ThresholdAction::Revoke);
        assert_eq!(evaluate(10, 10, ten()), ThresholdAction::NoOp);
    }

    #[test]
    fn threshold_of_one_grants_on_first_invite() {
        let one = Threshold::new(1).unwrap();
        assert_eq!(evaluate(0, 1, one), ThresholdAction::Grant);
        assert_eq!(evaluate(1, 0, one), ThresholdAction::Revoke);
    }

    #[test]
    fn zero_threshold_rejected() {
        assert_eq!(Threshold::new(0), Err(ThresholdError::Zero));
        assert_eq!(Threshold::try_from(0u64), Err(ThresholdError::Zero));
    }

    #[test]
    fn action_maps_to_privilege() {
        assert_eq!(ThresholdAction::Grant.privilege(), Some(PrivilegeAction::Grant));
        assert_eq!(ThresholdAction::Revoke.privilege(), Some(PrivilegeAction::Revoke));
        assert_eq!(ThresholdAction::NoOp.privilege(), None);
    }
}
