//! Agora API - Identity, Admission and Consistency Layer
//!
//! The axum service in front of the Agora social feed: request admission
//! (fixed-window rate limiting), bearer-token authentication, cache-aside
//! identity lookups, versioned post updates and the register / activate
//! user lifecycle with its compensating delete.
//!
//! PostgreSQL access goes through `deadpool-postgres`; everything above the
//! store traits also runs against `agora_storage::MockStorage`.

pub mod auth;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod jobs;
pub mod macros;
pub mod mailer;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use auth::{AuthConfig, Authenticator, Claims, JwtSecret, Principal, TokenError};
pub use config::{ApiConfig, CacheBackendKind, CacheSettings, MailConfig};
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{limiter_sweep_task, SweepMetrics, SweepSnapshot};
pub use mailer::{build_mailer, LogMailer, SendGridMailer};
pub use middleware::{auth_middleware, rate_limit_middleware, AuthMiddlewareState, RateLimitState};
pub use rate_limit::{FixedWindowLimiter, RateDecision};
pub use routes::create_api_router;
pub use services::{
    FeedService, IdentityService, OptimisticVersionStore, RegisterUser, Registration,
    UserLifecycleCoordinator,
};
pub use state::{build_identity_cache, AppState};
pub use types::*;
