//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must always hold while the engine runs.
//! Unlike example-based tests that check specific scenarios, invariants
//! verify behavioral properties across every generated event sequence.
//!
//! # Architecture
//!
//! The invariant system captures the ledger (and optionally the simulated
//! platform) into a [`LedgerSnapshot`], then runs registered [`Invariant`]
//! checks against it. Violations carry enough context to replay the failing
//! seed.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = LedgerSnapshot::capture(engine.storage(), threshold)?
//!     .with_platform(&platform, [community]);
//! registry.assert_all(&snapshot, "after step 12");
//! ```

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{AttributedMembersPresent, CountMatchesAttributions, PrivilegeMatchesThreshold};
pub use snapshot::{CommunitySnapshot, LedgerSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Which invariant was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantKind {
    /// Stored counter differs from the attribution records
    CountMatchesAttributions,
    /// An attributed invitee is no longer a member
    AttributedMembersPresent,
    /// Privilege holders differ from inviters at or above the threshold
    PrivilegeMatchesThreshold,
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CountMatchesAttributions => "count-matches-attributions",
            Self::AttributedMembersPresent => "attributed-members-present",
            Self::PrivilegeMatchesThreshold => "privilege-matches-threshold",
        };
        f.write_str(name)
    }
}

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Violated invariant.
    pub invariant: InvariantKind,
    /// Description of what went wrong.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against a ledger snapshot.
pub trait Invariant: Send + Sync {
    /// Invariant identity for error reporting.
    fn kind(&self) -> InvariantKind;

    /// Check the invariant against the captured state.
    ///
    /// Returns `Ok(())` if the invariant holds, or a [`Violation`]
    /// describing what went wrong.
    fn check(&self, state: &LedgerSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Invariants that hold after every handled event.
    ///
    /// Includes:
    /// - [`CountMatchesAttributions`]: counters equal live records
    /// - [`PrivilegeMatchesThreshold`]: grants track the threshold
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(CountMatchesAttributions);
        registry.add(PrivilegeMatchesThreshold);
        registry
    }

    /// Standard invariants plus those that only hold right after a
    /// reconciliation pass, when departures missed while offline have been
    /// pruned.
    pub fn after_reconcile() -> Self {
        let mut registry = Self::standard();
        registry.add(AttributedMembersPresent);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &LedgerSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation found.
    ///
    /// Use this in tests where you want immediate failure with context.
    #[allow(clippy::panic, reason = "test assertion helper")]
    pub fn assert_all(&self, state: &LedgerSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
