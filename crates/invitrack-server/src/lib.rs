//! Invitrack engine and runtime.
//!
//! Wraps [`invitrack_core`]'s pure attribution and threshold logic with the
//! stateful pieces: the per-community snapshot cache, the durable counter
//! ledger, reconciliation, and the tokio runtime that feeds membership events
//! through the engine.
//!
//! # Components
//!
//! - [`Engine`]: handles one event at a time per community
//! - [`Runtime`]: event loop spawning one task per event, plus periodic
//!   reconciliation
//! - [`Storage`]: counter ledger with [`MemoryStorage`], [`RedbStorage`] and
//!   [`ChaoticStorage`] backends
//! - [`Platform`]: the chat platform collaborator the host implements
//! - [`SystemEnv`]: production environment (system clock, tokio sleep)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod executor;
mod platform;
pub mod reconcile;
mod snapshot_store;
pub mod storage;
mod system_env;

use std::{collections::HashMap, pin::pin, sync::Arc, time::Duration};

pub use engine::{Engine, EngineConfig, EventOutcome, MemberEvent};
pub use error::{EngineError, RuntimeError};
use invitrack_core::{CommunityId, Environment};
pub use platform::{FetchError, Platform, PrivilegeError, PrivilegeNotice, PrivilegeRequest};
pub use reconcile::ReconcileReport;
pub use snapshot_store::{Refreshed, SnapshotGuard, SnapshotStore};
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage, Storage, StorageError};
pub use system_env::SystemEnv;
use tokio::{sync::mpsc, task::JoinSet};

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Engine configuration (threshold, delays, privilege name)
    pub engine: EngineConfig,
    /// How often every known community is reconciled. `None` disables
    /// periodic reconciliation; communities are then only reconciled when
    /// they become available or on request.
    pub reconcile_interval: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { engine: EngineConfig::default(), reconcile_interval: Some(Duration::from_secs(3600)) }
    }
}

/// Input to the runtime event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// A member joined or left
    Member(MemberEvent),
    /// The host gained access to a community (startup or newly joined).
    /// Warms the snapshot cache and reconciles.
    CommunityAvailable(CommunityId),
    /// The host lost access to a community. Drops its cached snapshot.
    CommunityUnavailable(CommunityId),
    /// Reconcile one community now
    Reconcile(CommunityId),
}

impl RuntimeEvent {
    /// Community the event belongs to.
    pub fn community(&self) -> CommunityId {
        match self {
            Self::Member(event) => event.community(),
            Self::CommunityAvailable(community)
            | Self::CommunityUnavailable(community)
            | Self::Reconcile(community) => *community,
        }
    }
}

/// Tokio event loop around an [`Engine`].
///
/// Each community gets its own lane: a task that handles that community's
/// events one at a time, in the order the loop received them. Lanes run in
/// parallel, so a slow community never delays another. Each event carries
/// its arrival time, so a queued join's debounce overlaps the wait.
pub struct Runtime<E, S, P>
where
    E: Environment,
    S: Storage,
    P: Platform,
{
    engine: Arc<Engine<E, S, P>>,
    reconcile_interval: Option<Duration>,
}

impl<E, S, P> Runtime<E, S, P>
where
    E: Environment,
    S: Storage,
    P: Platform,
{
    /// Build a runtime and its engine.
    ///
    /// # Errors
    ///
    /// `RuntimeError::Config` if the reconcile interval is zero.
    pub fn new(env: E, storage: S, platform: P, config: RuntimeConfig) -> Result<Self, RuntimeError> {
        if config.reconcile_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(RuntimeError::Config("reconcile interval must be non-zero".to_string()));
        }

        let engine = Engine::new(env, storage, platform, config.engine);
        Ok(Self { engine: Arc::new(engine), reconcile_interval: config.reconcile_interval })
    }

    /// Shared engine, for queries while the loop runs.
    pub fn engine(&self) -> &Arc<Engine<E, S, P>> {
        &self.engine
    }

    /// Process events until the channel closes, then wait for in-flight
    /// tasks.
    ///
    /// Failures are logged per event and never stop the loop.
    pub async fn run(self, mut events: mpsc::Receiver<RuntimeEvent>) {
        let engine = self.engine;
        let interval = self.reconcile_interval;
        let mut tasks = JoinSet::new();

        tracing::info!(
            threshold = %engine.config().threshold,
            reconcile_interval = ?interval,
            "runtime started"
        );

        let mut lanes: HashMap<CommunityId, Lane<E>> = HashMap::new();
        let mut tick = pin!(next_tick(engine.env(), interval));

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    let received_at = engine.env().now();
                    let lane = lanes.entry(event.community()).or_insert_with(|| {
                        let (lane, queue) = mpsc::unbounded_channel();
                        let engine = Arc::clone(&engine);
                        tasks.spawn(async move { run_lane(&engine, queue).await });
                        lane
                    });
                    if lane.send((event, received_at)).is_err() {
                        tracing::error!(
                            community = %event.community(),
                            "community lane closed, event dropped"
                        );
                    }
                },

                () = &mut tick => {
                    let task_engine = Arc::clone(&engine);
                    tasks.spawn(async move { reconcile_all(&task_engine).await });
                    tick.set(next_tick(engine.env(), interval));
                },

                Some(joined) = tasks.join_next() => log_task_exit(joined),
            }
        }

        // Closing the lanes lets each finish its queue and exit
        lanes.clear();
        tracing::info!(in_flight = tasks.len(), "event channel closed, draining");
        while let Some(joined) = tasks.join_next().await {
            log_task_exit(joined);
        }
        tracing::info!("runtime stopped");
    }
}

/// Completes after `interval`, or never when periodic reconciliation is off.
async fn next_tick<E: Environment>(env: &E, interval: Option<Duration>) {
    match interval {
        Some(interval) => env.sleep(interval).await,
        None => std::future::pending().await,
    }
}

/// Sender side of a community lane: events with their arrival time.
type Lane<E> = mpsc::UnboundedSender<(RuntimeEvent, <E as Environment>::Instant)>;

/// Handle one community's events in order until its lane is closed.
async fn run_lane<E, S, P>(
    engine: &Engine<E, S, P>,
    mut queue: mpsc::UnboundedReceiver<(RuntimeEvent, E::Instant)>,
) where
    E: Environment,
    S: Storage,
    P: Platform,
{
    while let Some((event, received_at)) = queue.recv().await {
        process(engine, event, received_at).await;
    }
}

async fn process<E, S, P>(
    engine: &Engine<E, S, P>,
    event: RuntimeEvent,
    received_at: E::Instant,
) where
    E: Environment,
    S: Storage,
    P: Platform,
{
    match event {
        RuntimeEvent::Member(member_event) => {
            if let Err(e) = engine.handle_event_received(member_event, received_at).await {
                tracing::error!(
                    community = %member_event.community(),
                    member = %member_event.member(),
                    "event dropped: {e}"
                );
            }
        },
        RuntimeEvent::CommunityAvailable(community) => {
            if let Err(e) = engine.initialize_community(community).await {
                tracing::error!(%community, "community initialization failed: {e}");
            }
        },
        RuntimeEvent::CommunityUnavailable(community) => {
            engine.forget_community(community).await;
        },
        RuntimeEvent::Reconcile(community) => {
            if let Err(e) = engine.reconcile(community).await {
                tracing::error!(%community, "reconciliation failed: {e}");
            }
        },
    }
}

/// Reconcile every known community, one after another.
async fn reconcile_all<E, S, P>(engine: &Engine<E, S, P>)
where
    E: Environment,
    S: Storage,
    P: Platform,
{
    let communities = match engine.known_communities().await {
        Ok(communities) => communities,
        Err(e) => {
            tracing::error!("periodic reconciliation skipped: {e}");
            return;
        },
    };

    tracing::debug!(communities = communities.len(), "periodic reconciliation");
    for community in communities {
        if let Err(e) = engine.reconcile(community).await {
            tracing::error!(%community, "reconciliation failed: {e}");
        }
    }
}

fn log_task_exit(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!("event task failed: {e}");
    }
}
