//! Time abstractions for testable timing operations.
//!
//! Backoff schedules and breadcrumb timestamps all flow through a `Clock`
//! so tests can advance time deterministically instead of sleeping.

use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};

/// Clock abstraction for timestamps.
///
/// Production code uses [`RealClock`]; tests inject [`TestClock`] and advance
/// virtual time explicitly. Timer waits stay on the tokio runtime, which
/// paused-clock tests already control.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real clock implementation using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock with controllable time progression.
///
/// Clones share the same underlying time, so a clock handed to the engine
/// can be advanced from the test body.
#[derive(Debug, Clone)]
pub struct TestClock {
    /// Microseconds since UNIX epoch.
    now_micros: Arc<AtomicI64>,
}

impl TestClock {
    /// Creates a test clock starting at the current system time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Creates a test clock starting at a specific instant.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { now_micros: Arc::new(AtomicI64::new(start.timestamp_micros())) }
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        let micros = i64::try_from(duration.as_micros()).unwrap_or(i64::MAX);
        self.now_micros.fetch_add(micros, Ordering::AcqRel);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let micros = self.now_micros.load(Ordering::Acquire);
        Utc.timestamp_micros(micros).single().unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let clock = TestClock::new();
        let start = clock.now();

        clock.advance(Duration::from_secs(10));

        assert_eq!(clock.now() - start, chrono::Duration::seconds(10));
    }

    #[test]
    fn test_clock_clones_share_time() {
        let clock = TestClock::new();
        let other = clock.clone();

        clock.advance(Duration::from_secs(5));

        assert_eq!(clock.now(), other.now());
    }

}
