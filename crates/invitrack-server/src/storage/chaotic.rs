//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails ledger operations to test error
//! handling. A failed operation never reaches the inner storage, matching a
//! transaction that aborted before commit.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use invitrack_core::{
    AttributionRecord, CommunityId, CountCorrection, CounterAggregate, JoinOutcome, LeaveOutcome,
    MemberId,
};

use super::{Storage, StorageError};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but randomly fails
/// operations based on a configured failure rate. Uses Arc<Mutex<>> for the
/// RNG state, making it Clone and thread-safe.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<Mutex<usize>>,
    failure_count: Arc<Mutex<usize>>,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator, so chaos tests are reproducible with the
/// same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Create a new chaotic storage wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(Mutex::new(0)),
            failure_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        *self.operation_count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of operations that were failed on purpose.
    pub fn failure_count(&self) -> usize {
        *self.failure_count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the operation and decide whether it fails.
    fn inject(&self, operation: &str) -> Result<(), StorageError> {
        *self.operation_count.lock().unwrap_or_else(PoisonError::into_inner) += 1;

        let fail = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .should_fail(self.failure_rate);

        if fail {
            *self.failure_count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
            return Err(StorageError::Io(format!("chaotic failure injection in {operation}")));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn record_join(&self, record: &AttributionRecord) -> Result<JoinOutcome, StorageError> {
        self.inject("record_join")?;
        self.inner.record_join(record)
    }

    fn record_leave(
        &self,
        community: CommunityId,
        invitee: MemberId,
    ) -> Result<Option<LeaveOutcome>, StorageError> {
        self.inject("record_leave")?;
        self.inner.record_leave(community, invitee)
    }

    fn read_count(&self, community: CommunityId, inviter: MemberId) -> Result<u64, StorageError> {
        self.inject("read_count")?;
        self.inner.read_count(community, inviter)
    }

    fn load_attribution(
        &self,
        community: CommunityId,
        invitee: MemberId,
    ) -> Result<Option<AttributionRecord>, StorageError> {
        self.inject("load_attribution")?;
        self.inner.load_attribution(community, invitee)
    }

    fn list_attributions(
        &self,
        community: CommunityId,
    ) -> Result<Vec<AttributionRecord>, StorageError> {
        self.inject("list_attributions")?;
        self.inner.list_attributions(community)
    }

    fn list_counters(&self, community: CommunityId) -> Result<Vec<CounterAggregate>, StorageError> {
        self.inject("list_counters")?;
        self.inner.list_counters(community)
    }

    fn list_communities(&self) -> Result<Vec<CommunityId>, StorageError> {
        self.inject("list_communities")?;
        self.inner.list_communities()
    }

    fn prune_attributions(
        &self,
        community: CommunityId,
        members: &HashSet<MemberId>,
    ) -> Result<Vec<AttributionRecord>, StorageError> {
        self.inject("prune_attributions")?;
        self.inner.prune_attributions(community, members)
    }

    fn rebuild_counters(&self, community: CommunityId) -> Result<Vec<CountCorrection>, StorageError> {
        self.inject("rebuild_counters")?;
        self.inner.rebuild_counters(community)
    }
}
