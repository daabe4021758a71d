//! Background Jobs for Agora API
//!
//! - `limiter_sweep`: drops expired rate-limit counters
//!
//! # Usage
//!
//! ```ignore
//! use agora_api::jobs::limiter_sweep_task;
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(limiter_sweep_task(Arc::clone(&limiter), config.rate_limit_sweep_interval, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod limiter_sweep;

pub use limiter_sweep::{limiter_sweep_task, SweepMetrics, SweepSnapshot};
