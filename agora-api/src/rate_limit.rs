//! Fixed-window request admission.
//!
//! One counter per client key. The check, the optional window reset and the
//! increment all happen while holding the DashMap shard guard returned by
//! `entry()`, so concurrent callers for the same key are serialized and no
//! more than `limit` requests are admitted per window.
//!
//! Expired counters are not removed by the request path; a single background
//! task calls [`FixedWindowLimiter::sweep_expired`] periodically
//! (see `jobs::limiter_sweep`).

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Per-key window state.
#[derive(Debug, Clone, Copy)]
struct ClientCounter {
    count: u32,
    window_started_at: Instant,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Admitted; `remaining` more requests fit in the current window.
    Allowed { remaining: u32 },
    /// Rejected until the current window ends.
    Throttled { retry_after: Duration },
}

impl RateDecision {
    pub fn is_permitted(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }

    /// Zero when permitted.
    pub fn retry_after(&self) -> Duration {
        match self {
            RateDecision::Allowed { .. } => Duration::ZERO,
            RateDecision::Throttled { retry_after } => *retry_after,
        }
    }
}

/// Process-local fixed-window rate limiter.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    counters: DashMap<String, ClientCounter>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            counters: DashMap::new(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.counters.len()
    }

    pub fn allow(&self, key: &str) -> RateDecision {
        self.allow_at(key, Instant::now())
    }

    /// Admission check against an explicit instant.
    ///
    /// Every call counts, including rejected ones.
    pub fn allow_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| ClientCounter {
                count: 0,
                window_started_at: now,
            });
        let counter = entry.value_mut();

        if now.saturating_duration_since(counter.window_started_at) >= self.window {
            counter.count = 0;
            counter.window_started_at = now;
        }

        counter.count = counter.count.saturating_add(1);

        if counter.count <= self.limit {
            RateDecision::Allowed {
                remaining: self.limit - counter.count,
            }
        } else {
            let elapsed = now.saturating_duration_since(counter.window_started_at);
            RateDecision::Throttled {
                retry_after: self.window.saturating_sub(elapsed),
            }
        }
    }

    /// Drop counters whose window has ended. Returns how many were removed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut removed = 0usize;
        self.counters.retain(|_, counter| {
            let live = now.saturating_duration_since(counter.window_started_at) < self.window;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }
}
