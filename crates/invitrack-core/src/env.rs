//! Environment abstraction for deterministic testing.
//!
//! Decouples engine logic from the clock. The join debounce delay and the
//! live-fetch timeout both sleep through this trait, so simulations can run
//! them on virtual time and production on the system clock.

use std::time::Duration;

/// Abstract environment providing time and async sleeping.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `wall_clock_secs()` is only used for informational timestamps, never
///   for ordering decisions
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while simulation
    /// environments use virtual time.
    type Instant: Copy + Ord + Send + Sync + 'static + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Dropping the returned future cancels the sleep, which is what keeps
    /// the debounce delay bounded and cancellable.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Seconds since the Unix epoch.
    ///
    /// Stamped on attribution records for auditing.
    fn wall_clock_secs(&self) -> u64;
}
