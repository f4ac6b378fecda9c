//! Simulated environment over tokio's clock.
//!
//! Run tests with `#[tokio::test(start_paused = true)]`: the clock then only
//! moves when every task is idle, jumping straight to the next timer. A two
//! second debounce costs no real time and every run sees the same timeline.

use std::time::Duration;

use invitrack_core::Environment;
use tokio::time::Instant;

/// Wall-clock time the simulation starts at (2024-01-01T00:00:00Z).
pub const SIM_EPOCH_SECS: u64 = 1_704_067_200;

/// Environment backed by tokio time and a fixed wall-clock epoch.
#[derive(Clone, Debug)]
pub struct SimEnv {
    started: Instant,
    epoch_secs: u64,
}

impl SimEnv {
    /// Environment whose wall clock starts at [`SIM_EPOCH_SECS`].
    pub fn new() -> Self {
        Self::with_epoch(SIM_EPOCH_SECS)
    }

    /// Environment whose wall clock starts at `epoch_secs`.
    pub fn with_epoch(epoch_secs: u64) -> Self {
        Self { started: Instant::now(), epoch_secs }
    }

    /// Virtual time since the environment was created.
    pub fn elapsed(&self) -> Duration {
        Instant::now() - self.started
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn wall_clock_secs(&self) -> u64 {
        self.epoch_secs + self.elapsed().as_secs()
    }
}
