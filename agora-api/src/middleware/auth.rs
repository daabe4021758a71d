//! Axum Middleware for Authentication
//!
//! Validates `Authorization: Bearer <token>`, loads the subject through the
//! identity service and injects a [`Principal`] into request extensions.
//! Handlers take the principal through its extractor and pass it on
//! explicitly.

use crate::auth::{Authenticator, Principal};
use crate::error::{ApiError, ErrorCode};
use crate::services::IdentityService;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

#[derive(Debug, Clone)]
pub struct AuthMiddlewareState {
    pub authenticator: Authenticator,
    pub identity: IdentityService,
}

impl AuthMiddlewareState {
    pub fn new(authenticator: Authenticator, identity: IdentityService) -> Self {
        Self {
            authenticator,
            identity,
        }
    }
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Reject requests without a valid bearer token for an existing user.
///
/// Every failure is a 401 with no hint about which check failed.
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Authorization header is missing"))?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Authorization header is malformed"))?;

    let claims = state.authenticator.validate_token(token)?;
    let user_id = claims.user_id()?;

    let user = state.identity.load_user(user_id).await.map_err(|e| {
        if e.code == ErrorCode::EntityNotFound {
            tracing::debug!(user_id, "Token subject no longer exists");
            ApiError::unauthorized("Invalid or expired token")
        } else {
            e
        }
    })?;

    request.extensions_mut().insert(Principal::new(user));
    Ok(next.run(request).await)
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// Pulls the [`Principal`] injected by [`auth_middleware`].
///
/// Using it on a route without the middleware is a wiring bug and yields 500.
#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Principal>().cloned().ok_or_else(|| {
            ApiError::internal_error(
                "Principal not found in request extensions. \
                 Ensure auth_middleware is applied to this route.",
            )
        })
    }
}
