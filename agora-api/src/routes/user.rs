//! User REST API Routes
//!
//! Activation is public (the token is the credential). Profile lookups,
//! the follow graph and the feed require a bearer token.

use agora_core::UserId;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use std::sync::Arc;

use crate::{
    auth::Principal,
    error::ApiResult,
    middleware::{auth_middleware, AuthMiddlewareState},
    services::{FeedService, IdentityService, UserLifecycleCoordinator},
    state::AppState,
    types::FeedParams,
};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// PUT /v1/users/activate/:token - Consume an invitation and activate its user
pub async fn activate_user(
    State(lifecycle): State<Arc<UserLifecycleCoordinator>>,
    Path(token): Path<String>,
) -> ApiResult<impl IntoResponse> {
    lifecycle.activate(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/users/:id - Fetch a user profile
pub async fn get_user(
    State(identity): State<IdentityService>,
    principal: Principal,
    Path(user_id): Path<UserId>,
) -> ApiResult<impl IntoResponse> {
    tracing::debug!(user_id, requested_by = principal.user_id(), "User lookup");
    let user = identity.load_user(user_id).await?;
    Ok(Json(user))
}

/// PUT /v1/users/:id/follow - Follow another user
pub async fn follow_user(
    State(feeds): State<FeedService>,
    principal: Principal,
    Path(user_id): Path<UserId>,
) -> ApiResult<impl IntoResponse> {
    feeds.follow(&principal, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /v1/users/:id/unfollow
pub async fn unfollow_user(
    State(feeds): State<FeedService>,
    principal: Principal,
    Path(user_id): Path<UserId>,
) -> ApiResult<impl IntoResponse> {
    feeds.unfollow(&principal, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/users/feed - Paginated posts from the caller and everyone they follow
///
/// Query: `limit` (1-20, default 20), `offset`, `sort` (`asc`|`desc`),
/// `search`, `tags` (comma-separated, any match).
pub async fn get_feed(
    State(feeds): State<FeedService>,
    principal: Principal,
    Query(params): Query<FeedParams>,
) -> ApiResult<impl IntoResponse> {
    let query = params.into_query()?;
    let items = feeds.feed(&principal, &query).await?;
    Ok(Json(items))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(auth_state: AuthMiddlewareState) -> Router<AppState> {
    let protected = Router::new()
        .route("/v1/users/feed", get(get_feed))
        .route("/v1/users/:id", get(get_user))
        .route("/v1/users/:id/follow", put(follow_user))
        .route("/v1/users/:id/unfollow", put(unfollow_user))
        .route_layer(from_fn_with_state(auth_state, auth_middleware));

    Router::new()
        .route("/v1/users/activate/:token", put(activate_user))
        .merge(protected)
}
