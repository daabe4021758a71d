//! REST API Routes Module
//!
//! - `/v1/health` (public)
//! - `/v1/authentication/*` registration and token issuance (public)
//! - `/v1/users/*` activation (public); profile lookup, follow/unfollow and
//!   the feed (bearer token)
//! - `/v1/posts/*` versioned post CRUD and comments (bearer token)

pub mod auth;
pub mod health;
pub mod post;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::rate_limit_middleware;
use crate::state::AppState;

pub use auth::create_router as auth_router;
pub use health::create_router as health_router;
pub use post::create_router as post_router;
pub use user::create_router as user_router;

// ============================================================================
// PRODUCTION VALIDATION
// ============================================================================

fn validate_api_config_for_production(config: &ApiConfig) -> ApiResult<()> {
    if config.cors_origins.is_empty() {
        return Err(ApiError::invalid_input(
            "CORS origins not configured for production. Set AGORA_CORS_ORIGINS.",
        ));
    }
    if !config.rate_limit_enabled {
        tracing::warn!(
            "Rate limiting is disabled in production. Set AGORA_RATE_LIMIT_ENABLED=true to enable it."
        );
    }
    Ok(())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Empty origin list allows any origin (development). Otherwise each request
/// origin goes through [`ApiConfig::is_origin_allowed`], so `*.domain`
/// entries match subdomains.
fn build_cors_layer(config: &Arc<ApiConfig>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        return cors.allow_origin(Any);
    }

    tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
    let config = Arc::clone(config);
    cors.allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        origin
            .to_str()
            .map(|o| config.is_origin_allowed(o))
            .unwrap_or(false)
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Build the complete API router.
///
/// # Middleware Order (outer to inner)
/// 1. CORS - answers preflight requests
/// 2. Trace - one span per request
/// 3. Rate limiting - every route, before any auth or store work
/// 4. Auth - only on the protected routes, via `route_layer`
///
/// In production this refuses insecure auth or CORS settings.
pub fn create_api_router(state: AppState) -> ApiResult<Router> {
    if state.config.is_production() {
        state.authenticator.config().validate_for_production()?;
        validate_api_config_for_production(&state.config)?;
    }

    let auth_state = state.auth_state();
    let rate_limit_state = state.rate_limit_state();
    let cors = build_cors_layer(&state.config);

    let router = Router::new()
        .merge(health::create_router())
        .merge(auth::create_router())
        .merge(user::create_router(auth_state.clone()))
        .merge(post::create_router(auth_state))
        .fallback(|| async { ApiError::not_found("Route not found") })
        .with_state(state);

    Ok(router
        .layer(from_fn_with_state(rate_limit_state, rate_limit_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    async fn allowed_origin(config: ApiConfig, origin: &str) -> Result<Option<String>, String> {
        let app: Router = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(build_cors_layer(&Arc::new(config)));
        let request = Request::builder()
            .uri("/ping")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = app.oneshot(request).await.map_err(|e| format!("{:?}", e))?;
        Ok(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }

    #[tokio::test]
    async fn test_cors_wildcard_subdomain_matches() -> Result<(), String> {
        let config = ApiConfig {
            cors_origins: vec![
                "https://agora.social".to_string(),
                "*.agora.social".to_string(),
            ],
            ..ApiConfig::default()
        };

        assert_eq!(
            allowed_origin(config.clone(), "https://app.agora.social").await?.as_deref(),
            Some("https://app.agora.social")
        );
        assert_eq!(
            allowed_origin(config.clone(), "https://agora.social").await?.as_deref(),
            Some("https://agora.social")
        );
        assert_eq!(allowed_origin(config, "https://evil.com").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_cors_without_origins_allows_any() -> Result<(), String> {
        assert_eq!(
            allowed_origin(ApiConfig::default(), "https://anything.example").await?.as_deref(),
            Some("*")
        );
        Ok(())
    }

    #[test]
    fn test_production_requires_cors_origins() {
        let config = ApiConfig {
            environment: "production".to_string(),
            ..ApiConfig::default()
        };
        assert!(validate_api_config_for_production(&config).is_err());

        let config = ApiConfig {
            cors_origins: vec!["https://agora.example".to_string()],
            ..config
        };
        assert!(validate_api_config_for_production(&config).is_ok());
    }
}
