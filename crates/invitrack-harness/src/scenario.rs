//! Seeded traffic generator.
//!
//! Produces long, realistic operation sequences from a single `u64` seed:
//! mostly joins through invites, some churn, the occasional vanity join,
//! redelivery, missed leave and reconciliation pass. The same seed always
//! yields the same sequence, so a failing soak run is replayed by its seed.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::model::{INVITERS, MEMBERS, Operation};

/// Relative weights of each operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficProfile {
    /// Owned invite created
    pub create_invite: u32,
    /// Unowned invite created
    pub create_unowned: u32,
    /// Join through an invite
    pub join: u32,
    /// Join through the vanity URL
    pub vanity_join: u32,
    /// Join event redelivered
    pub redeliver: u32,
    /// Leave with event
    pub leave: u32,
    /// Leave while offline
    pub silent_leave: u32,
    /// Reconciliation pass
    pub reconcile: u32,
}

impl TrafficProfile {
    /// Growing community: joins dominate, little churn.
    pub const GROWTH: Self = Self {
        create_invite: 4,
        create_unowned: 1,
        join: 40,
        vanity_join: 3,
        redeliver: 3,
        leave: 8,
        silent_leave: 1,
        reconcile: 2,
    };

    /// Churning community: members come and go, events get lost.
    pub const CHURN: Self = Self {
        create_invite: 3,
        create_unowned: 1,
        join: 25,
        vanity_join: 4,
        redeliver: 6,
        leave: 20,
        silent_leave: 6,
        reconcile: 4,
    };

    fn total(&self) -> u32 {
        self.create_invite
            + self.create_unowned
            + self.join
            + self.vanity_join
            + self.redeliver
            + self.leave
            + self.silent_leave
            + self.reconcile
    }
}

impl Default for TrafficProfile {
    fn default() -> Self {
        Self::GROWTH
    }
}

/// Deterministic operation stream.
pub struct Scenario {
    rng: ChaCha8Rng,
    profile: TrafficProfile,
}

impl Scenario {
    /// Scenario with the default profile.
    pub fn new(seed: u64) -> Self {
        Self::with_profile(seed, TrafficProfile::default())
    }

    /// Scenario with a custom profile.
    ///
    /// # Panics
    ///
    /// If every weight is zero.
    pub fn with_profile(seed: u64, profile: TrafficProfile) -> Self {
        assert!(profile.total() > 0, "traffic profile must have a non-zero weight");
        Self { rng: ChaCha8Rng::seed_from_u64(seed), profile }
    }

    /// Next operation.
    pub fn next_op(&mut self) -> Operation {
        let p = self.profile;
        let mut roll = self.rng.gen_range(0..p.total());

        let mut pick = |weight: u32| {
            if roll < weight {
                true
            } else {
                roll -= weight;
                false
            }
        };

        if pick(p.create_invite) {
            Operation::CreateInvite { owner: self.rng.gen_range(0..INVITERS) }
        } else if pick(p.create_unowned) {
            Operation::CreateUnownedInvite
        } else if pick(p.join) {
            Operation::Join { member: self.member(), invite: self.rng.r#gen() }
        } else if pick(p.vanity_join) {
            Operation::VanityJoin { member: self.member() }
        } else if pick(p.redeliver) {
            Operation::RedeliverJoin { member: self.member() }
        } else if pick(p.leave) {
            Operation::Leave { member: self.member() }
        } else if pick(p.silent_leave) {
            Operation::SilentLeave { member: self.member() }
        } else {
            Operation::Reconcile
        }
    }

    /// The next `len` operations.
    pub fn take(&mut self, len: usize) -> Vec<Operation> {
        (0..len).map(|_| self.next_op()).collect()
    }

    fn member(&mut self) -> u8 {
        self.rng.gen_range(0..MEMBERS)
    }
}
