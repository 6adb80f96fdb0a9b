//! Fixed-window rate limiting.

use crate::shard::ShardedMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-identity counting window.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    window_start: Instant,
    count: u32,
}

/// Per-identity fixed-window admission control.
///
/// Counters reset when a window expires instead of sliding continuously.
/// That keeps the decision O(1) in time and memory per identity, at the cost
/// of admitting up to `2 * limit` events across a window boundary — a known,
/// accepted approximation.
pub struct RateLimiter {
    windows: ShardedMap<RateWindow>,
    limit: u32,
    period: Duration,
    denied_total: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter admitting `limit` events per `period` per identity.
    #[must_use]
    pub fn new(limit: u32, period: Duration) -> Self {
        Self {
            windows: ShardedMap::default(),
            limit,
            period,
            denied_total: AtomicU64::new(0),
        }
    }

    /// Admits or denies one event for `identity` at `now`.
    ///
    /// Admission increments the window count; denial leaves the window
    /// untouched. The window entry is created on first sight of an identity.
    /// Never blocks beyond the shard lock.
    pub fn admit(&self, identity: i64, now: Instant) -> bool {
        let admitted = {
            let mut shard = self.windows.lock(identity);
            let window = shard.entry(identity).or_insert(RateWindow {
                window_start: now,
                count: 0,
            });

            if now.duration_since(window.window_start) >= self.period {
                window.window_start = now;
                window.count = 0;
            }

            if window.count < self.limit {
                window.count += 1;
                true
            } else {
                false
            }
        };

        if !admitted {
            self.denied_total.fetch_add(1, Ordering::Relaxed);
        }
        admitted
    }

    /// Number of identities with a tracked window.
    #[must_use]
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }

    /// Total denials since startup.
    #[must_use]
    pub fn denied_total(&self) -> u64 {
        self.denied_total.load(Ordering::Relaxed)
    }

    /// Configured per-window limit.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Configured window length.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }
}
