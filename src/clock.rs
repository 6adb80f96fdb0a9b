//! Injectable monotonic clock.
//!
//! Rate-limit windows and session-age checks depend on monotonic time.
//! Abstracting the time source behind a trait keeps those decisions
//! deterministic in tests.

use std::time::Instant;

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Returns the current monotonic instant.
    fn now(&self) -> Instant;
}

/// Production clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
