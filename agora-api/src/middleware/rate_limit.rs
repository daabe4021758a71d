//! Rate limiting middleware.
//!
//! Keys requests by client IP and asks the shared [`FixedWindowLimiter`]
//! before dispatch. Rejections are 429 with `Retry-After` in whole seconds.

use crate::error::ApiError;
use crate::rate_limit::{FixedWindowLimiter, RateDecision};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub limiter: Arc<FixedWindowLimiter>,
    pub enabled: bool,
}

impl RateLimitState {
    pub fn new(limiter: Arc<FixedWindowLimiter>, enabled: bool) -> Self {
        Self { limiter, enabled }
    }
}

/// Error type for rate limit middleware.
#[derive(Debug)]
pub struct RateLimitError {
    /// Seconds until the window resets
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let mut response = ApiError::too_many_requests(self.retry_after).into_response();
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(self.retry_after));
        response
    }
}

/// Whole seconds for `Retry-After`, rounded up, at least 1.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

/// Extract client IP from request, considering proxy headers.
fn client_ip(request: &Request) -> Option<IpAddr> {
    // X-Forwarded-For can contain multiple IPs, take the first one
    if let Some(ip) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
    {
        return Some(ip);
    }

    if let Some(ip) = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
    {
        return Some(ip);
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Rate limiting middleware.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.enabled {
        return Ok(next.run(request).await);
    }

    let key = match client_ip(&request) {
        Some(ip) => ip.to_string(),
        None => "unknown".to_string(),
    };

    match state.limiter.allow(&key) {
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(
                X_RATELIMIT_LIMIT.clone(),
                HeaderValue::from(state.limiter.limit()),
            );
            headers.insert(X_RATELIMIT_REMAINING.clone(), HeaderValue::from(remaining));
            Ok(response)
        }
        RateDecision::Throttled { retry_after } => {
            let retry_after = retry_after_secs(retry_after);
            tracing::warn!(client_key = %key, retry_after_secs = retry_after, "Rate limit exceeded");
            Err(RateLimitError { retry_after })
        }
    }
}
