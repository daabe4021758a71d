//! Middleware modules for Agora API
//!
//! - `rate_limit`: per-client fixed-window admission, runs first
//! - `auth`: bearer token validation and principal injection
//!
//! # Middleware Order
//!
//! ```ignore
//! Router::new()
//!     .route("/v1/posts", post(handler))
//!     // Auth only on protected routes
//!     .route_layer(middleware::from_fn_with_state(auth_state, auth_middleware))
//!     // Rate limiting wraps everything, so it runs before auth
//!     .layer(middleware::from_fn_with_state(rate_limit_state, rate_limit_middleware))
//! ```

mod auth;
mod rate_limit;

pub use auth::{auth_middleware, AuthMiddlewareState};
pub use rate_limit::{rate_limit_middleware, retry_after_secs, RateLimitError, RateLimitState};
