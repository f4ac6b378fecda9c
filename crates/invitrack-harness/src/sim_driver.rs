//! Simulation driver for model-based testing.
//!
//! `SimDriver` owns a real [`Engine`] running against a [`SimPlatform`] and
//! a [`ModelWorld`] describing the same community. Every operation is applied
//! to the model first; the driver then performs the resulting platform
//! change, delivers the event to the engine and compares the engine's answer
//! with the model's.
//!
//! Run it under a paused tokio clock: the engine's debounce sleeps then cost
//! no real time.

use std::{collections::BTreeSet, fmt};

use invitrack_core::{CommunityId, Threshold};
use invitrack_server::{Engine, EngineConfig, EventOutcome, MemberEvent, Storage};

use crate::{
    invariants::{InvariantRegistry, LedgerSnapshot},
    model::{ModelStep, ModelWorld, Operation},
    sim_env::SimEnv,
    sim_platform::SimPlatform,
};

/// Community every driver simulates.
pub const SIM_COMMUNITY: CommunityId = CommunityId(0x1D);

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// Engine, platform and model advanced in lockstep.
pub struct SimDriver<S: Storage> {
    engine: Engine<SimEnv, S, SimPlatform>,
    platform: SimPlatform,
    world: ModelWorld,
    steps: usize,
}

impl<S: Storage> SimDriver<S> {
    /// Create a driver and warm the engine's snapshot cache.
    pub async fn new(storage: S, threshold: Threshold) -> Result<Self, SimDriverError> {
        let platform = SimPlatform::new();
        platform.add_community(SIM_COMMUNITY, "Simulated");

        let config = EngineConfig { threshold, ..EngineConfig::default() };
        let engine = Engine::new(SimEnv::new(), storage, platform.clone(), config);

        engine
            .initialize_community(SIM_COMMUNITY)
            .await
            .map_err(|e| SimDriverError(format!("initialization failed: {e}")))?;

        Ok(Self { engine, platform, world: ModelWorld::new(threshold), steps: 0 })
    }

    /// Engine under test.
    pub fn engine(&self) -> &Engine<SimEnv, S, SimPlatform> {
        &self.engine
    }

    /// Simulated platform.
    pub fn platform(&self) -> &SimPlatform {
        &self.platform
    }

    /// Reference model.
    pub fn world(&self) -> &ModelWorld {
        &self.world
    }

    /// Operations applied so far, skipped ones included.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Apply one operation to model, platform and engine, then check that
    /// they agree.
    pub async fn apply(&mut self, op: &Operation) -> Result<ModelStep, SimDriverError> {
        self.steps += 1;
        let step = self.world.apply(op);
        if step == ModelStep::Skipped {
            return Ok(step);
        }
        let context = format!("step {} ({op})", self.steps);
        tracing::debug!(step = self.steps, %op, "applying operation");

        match &step {
            ModelStep::Skipped => {},
            ModelStep::InviteCreated { code, owner } => match owner {
                Some(owner) => self.platform.create_invite(SIM_COMMUNITY, code.as_str(), *owner, 0),
                None => self.platform.create_unowned_invite(SIM_COMMUNITY, code.as_str(), 0),
            },
            ModelStep::Joined { member, via, expected } => {
                match via {
                    Some(code) => {
                        if !self.platform.join_via(SIM_COMMUNITY, *member, code) {
                            return Err(SimDriverError(format!("{context}: invite {code} missing")));
                        }
                    },
                    None => self.platform.join_vanity(SIM_COMMUNITY, *member),
                }
                let event = MemberEvent::Joined { community: SIM_COMMUNITY, member: *member };
                self.deliver(event, expected, &context).await?;
            },
            ModelStep::Redelivered { member, expected } => {
                let event = MemberEvent::Joined { community: SIM_COMMUNITY, member: *member };
                self.deliver(event, expected, &context).await?;
            },
            ModelStep::Left { member, expected } => {
                self.platform.remove_member(SIM_COMMUNITY, *member);
                let event = MemberEvent::Left { community: SIM_COMMUNITY, member: *member };
                self.deliver(event, expected, &context).await?;
            },
            ModelStep::LeftSilently { member } => {
                self.platform.remove_member(SIM_COMMUNITY, *member);
            },
            ModelStep::Reconciled { pruned, corrections } => {
                let report = self
                    .engine
                    .reconcile(SIM_COMMUNITY)
                    .await
                    .map_err(|e| {
                tracing::error!(error = %e, "engine rejected event");
                SimDriverError(format!("{context}: {e}"))
            })?;

                let actual: BTreeSet<_> = report.pruned.iter().map(|r| r.invitee).collect();
                if &actual != pruned {
                    return Err(SimDriverError(format!(
                        "{context}: pruned {actual:?}, model pruned {pruned:?}"
                    )));
                }
                if &report.corrections != corrections {
                    return Err(SimDriverError(format!(
                        "{context}: corrections {:?}, model expected {corrections:?}",
                        report.corrections
                    )));
                }
            },
        }

        self.check(&context, matches!(step, ModelStep::Reconciled { .. }))?;
        Ok(step)
    }

    /// Apply every operation, stopping at the first disagreement.
    pub async fn run(&mut self, ops: &[Operation]) -> Result<(), SimDriverError> {
        for op in ops {
            self.apply(op).await?;
        }
        Ok(())
    }

    /// Capture ledger and platform state for invariant checks.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, SimDriverError> {
        LedgerSnapshot::capture(self.engine.storage(), self.world.threshold())
            .map(|snapshot| snapshot.with_platform(&self.platform, [SIM_COMMUNITY]))
            .map_err(|e| SimDriverError(format!("snapshot failed: {e}")))
    }

    async fn deliver(
        &self,
        event: MemberEvent,
        expected: &EventOutcome,
        context: &str,
    ) -> Result<(), SimDriverError> {
        let actual = self
            .engine
            .handle_event(event)
            .await
            .map_err(|e| SimDriverError(format!("{context}: {e}")))?;

        if &actual != expected {
            return Err(SimDriverError(format!(
                "{context}: engine reported {actual:?}, model expected {expected:?}"
            )));
        }
        Ok(())
    }

    /// Compare engine state with the model and run the invariants.
    fn check(&self, context: &str, reconciled: bool) -> Result<(), SimDriverError> {
        let snapshot = self.snapshot()?;

        let registry =
            if reconciled { InvariantRegistry::after_reconcile() } else { InvariantRegistry::standard() };
        registry.check_all(&snapshot).map_err(|violations| {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            SimDriverError(format!("{context}: {}", messages.join("; ")))
        })?;

        let stored = snapshot
            .communities
            .get(&SIM_COMMUNITY)
            .map(|community| community.attributions.clone())
            .unwrap_or_default();
        if &stored != self.world.attributions() {
            return Err(SimDriverError(format!(
                "{context}: ledger {stored:?}, model {:?}",
                self.world.attributions()
            )));
        }

        let privileged = self.platform.privileged(SIM_COMMUNITY);
        if privileged != self.world.privileged() {
            return Err(SimDriverError(format!(
                "{context}: privileged {privileged:?}, model {:?}",
                self.world.privileged()
            )));
        }

        Ok(())
    }
}
