//! Post REST API Routes
//!
//! All endpoints require a bearer token. Updates carry the version the
//! client last read and fail with 409 when someone else got there first.
//! Reading a post returns its comments with it.

use agora_core::PostId;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::{
    auth::Principal,
    error::ApiResult,
    middleware::{auth_middleware, AuthMiddlewareState},
    services::OptimisticVersionStore,
    state::AppState,
    types::{CreateCommentRequest, CreatePostRequest, UpdatePostRequest},
};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /v1/posts - Create a post owned by the caller
pub async fn create_post(
    State(posts): State<OptimisticVersionStore>,
    principal: Principal,
    Json(req): Json<CreatePostRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let post = posts
        .create(&principal, req.title, req.content, req.tags)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /v1/posts/:id - The post with its comments, newest first
pub async fn get_post(
    State(posts): State<OptimisticVersionStore>,
    Path(post_id): Path<PostId>,
) -> ApiResult<impl IntoResponse> {
    let post = posts.get_with_comments(post_id).await?;
    Ok(Json(post))
}

/// POST /v1/posts/:id/comments
pub async fn create_comment(
    State(posts): State<OptimisticVersionStore>,
    principal: Principal,
    Path(post_id): Path<PostId>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let comment = posts.comment(&principal, post_id, req.content).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// PATCH /v1/posts/:id - Versioned partial update
pub async fn update_post(
    State(posts): State<OptimisticVersionStore>,
    principal: Principal,
    Path(post_id): Path<PostId>,
    Json(req): Json<UpdatePostRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let post = posts
        .edit(&principal, post_id, &req.changes(), req.version)
        .await?;
    Ok(Json(post))
}

/// DELETE /v1/posts/:id
pub async fn delete_post(
    State(posts): State<OptimisticVersionStore>,
    principal: Principal,
    Path(post_id): Path<PostId>,
) -> ApiResult<impl IntoResponse> {
    posts.delete(&principal, post_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(auth_state: AuthMiddlewareState) -> Router<AppState> {
    Router::new()
        .route("/v1/posts", post(create_post))
        .route(
            "/v1/posts/:id",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/v1/posts/:id/comments", post(create_comment))
        .route_layer(from_fn_with_state(auth_state, auth_middleware))
}
