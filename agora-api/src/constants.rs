//! Constants for Agora API
//!
//! Defaults for every environment-driven setting live here.

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Placeholder secret used when `AGORA_JWT_SECRET` is unset. Rejected in production.
pub const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

/// Default token lifetime in seconds (3 days)
pub const DEFAULT_JWT_EXPIRATION_SECS: i64 = 259_200;

pub const DEFAULT_JWT_ISSUER: &str = "agora";

pub const DEFAULT_JWT_AUDIENCE: &str = "agora";

pub const DEFAULT_JWT_CLOCK_SKEW_SECS: i64 = 0;

/// Minimum secret length accepted in production
pub const MIN_PRODUCTION_SECRET_LEN: usize = 32;

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Requests admitted per client per window
pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 20;

/// Fixed window length in seconds
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 5;

// ============================================================================
// USER LIFECYCLE
// ============================================================================

/// How long an activation link stays valid (3 days)
pub const DEFAULT_INVITATION_EXPIRY_SECS: u64 = 259_200;

/// Frontend base URL used to build activation links
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:4000";

/// Path segment of the activation link on the frontend
pub const ACTIVATION_PATH: &str = "/confirm/";

// ============================================================================
// STORAGE AND CACHE
// ============================================================================

/// Deadline on each relational store call in milliseconds
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;

pub const DEFAULT_CACHE_PATH: &str = "./data/identity-cache";

pub const DEFAULT_CACHE_MAX_MB: usize = 64;

/// Identity cache TTL in seconds
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;

pub const DEFAULT_CACHE_TIMEOUT_MS: u64 = 5000;

// ============================================================================
// MAIL
// ============================================================================

pub const DEFAULT_MAIL_FROM_NAME: &str = "Agora";

pub const DEFAULT_MAIL_FROM_EMAIL: &str = "no-reply@agora.local";

pub const DEFAULT_MAIL_MAX_RETRIES: u32 = 3;

pub const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

// ============================================================================
// INPUT LIMITS
// ============================================================================

pub const MAX_USERNAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 255;
pub const MIN_PASSWORD_LEN: usize = 3;
pub const MAX_PASSWORD_LEN: usize = 72;
pub const MAX_POST_TITLE_LEN: usize = 100;
pub const MAX_POST_CONTENT_LEN: usize = 1000;
pub const MAX_COMMENT_CONTENT_LEN: usize = 1000;

// ============================================================================
// FEED
// ============================================================================

/// Largest page a feed request may ask for
pub const MAX_FEED_LIMIT: i64 = 20;
pub const MAX_FEED_SEARCH_LEN: usize = 100;
pub const MAX_FEED_TAGS: usize = 5;

// ============================================================================
// SERVER
// ============================================================================

pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 8080;
