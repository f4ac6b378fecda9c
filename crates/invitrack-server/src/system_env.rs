//! Production Environment implementation using the system clock.
//!
//! - Real monotonic time (`std::time::Instant`) that advances naturally
//! - Tokio async sleep for the debounce delay and fetch timeouts
//! - Wall-clock seconds from `SystemTime` for attribution timestamps

use std::time::Duration;

use invitrack_core::Environment;

/// Production environment using system time.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    /// A clock set before 1970 yields 0; the timestamp is informational only.
    #[allow(clippy::disallowed_methods)]
    fn wall_clock_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::disallowed_methods)]
    fn system_env_time_advances() {
        let env = SystemEnv::new();

        let t1 = env.now();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = env.now();

        assert!(t2 > t1, "Time should advance");
    }

    #[test]
    fn system_env_wall_clock_is_after_2020() {
        let env = SystemEnv::new();
        assert!(env.wall_clock_secs() > 1_577_836_800);
    }

    #[tokio::test]
    async fn system_env_sleep_works() {
        let env = SystemEnv::new();

        let start = env.now();
        env.sleep(Duration::from_millis(50)).await;
        let elapsed = env.now() - start;

        assert!(elapsed >= Duration::from_millis(50), "Sleep should wait at least 50ms");
    }
}
