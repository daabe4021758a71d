//! Agora Telemetry
//!
//! Structured JSON logging through `tracing-subscriber`. Per-request spans
//! come from the `TraceLayer` on the router.

pub mod tracer;

pub use tracer::{init_tracing, TelemetryConfig, DEFAULT_LOG_FILTER};
