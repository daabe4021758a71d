//! Authentication REST API Routes
//!
//! Public endpoints: account registration and token issuance.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use std::sync::Arc;

use crate::{
    auth::Authenticator,
    error::ApiResult,
    services::{IdentityService, RegisterUser, UserLifecycleCoordinator},
    state::AppState,
    types::{CreateTokenRequest, RegisterUserRequest, RegistrationResponse, TokenResponse},
};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /v1/authentication/user - Register an inactive account and mail its invitation
pub async fn register_user(
    State(lifecycle): State<Arc<UserLifecycleCoordinator>>,
    Json(req): Json<RegisterUserRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let profile = RegisterUser {
        username: req.username.trim().to_string(),
        email: req.email.trim().to_string(),
    };
    let registration = lifecycle.register(profile, &req.password).await?;

    let response = RegistrationResponse {
        token: registration.activation_token.expose().to_string(),
        user: registration.user,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /v1/authentication/token - Exchange credentials of an active user for a JWT
pub async fn create_token(
    State(identity): State<IdentityService>,
    State(authenticator): State<Authenticator>,
    Json(req): Json<CreateTokenRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let user = identity.authenticate(req.email.trim(), &req.password).await?;
    let token = authenticator.issue_for(user.id)?;

    tracing::info!(user_id = user.id, "Token issued");
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/v1/authentication/user", post(register_user))
        .route("/v1/authentication/token", post(create_token))
}
