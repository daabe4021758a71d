//! Rate Limiter Sweep Task
//!
//! A single task per process clears counters whose fixed window has ended,
//! so the limiter map stays bounded by the number of clients seen in the
//! last window rather than growing forever.

use crate::rate_limit::FixedWindowLimiter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct SweepMetrics {
    /// Sweep cycles completed
    pub sweeps: AtomicU64,

    /// Counters removed since startup
    pub counters_removed: AtomicU64,
}

impl SweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            counters_removed: self.counters_removed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSnapshot {
    pub sweeps: u64,
    pub counters_removed: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Periodically sweep expired counters until shutdown is signalled.
///
/// Returns the metrics collected over the task's lifetime.
pub async fn limiter_sweep_task(
    limiter: Arc<FixedWindowLimiter>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics> {
    let metrics = Arc::new(SweepMetrics::new());

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_ms = every.as_millis() as u64,
        limit = limiter.limit(),
        window_secs = limiter.window().as_secs(),
        "Rate limiter sweep task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also means shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Rate limiter sweep task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                let removed = limiter.sweep_expired(Instant::now());
                metrics.sweeps.fetch_add(1, Ordering::Relaxed);
                metrics.counters_removed.fetch_add(removed as u64, Ordering::Relaxed);
                if removed > 0 {
                    tracing::debug!(removed, remaining = limiter.tracked_keys(), "Swept expired rate limit counters");
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        counters_removed = snapshot.counters_removed,
        "Rate limiter sweep task completed"
    );

    metrics
}
