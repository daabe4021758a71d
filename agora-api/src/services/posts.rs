//! Post Service
//!
//! Version-checked post mutations. Updates are a single conditional write in
//! the store; a stale version is reported as `CONCURRENT_MODIFICATION` and
//! the caller decides whether to reload and retry.
//!
//! Comments hang off posts and are never versioned.

use agora_core::{Comment, NewComment, NewPost, Post, PostChanges, PostId, Role, StorageError};
use agora_storage::{with_deadline, PostStore};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::types::PostWithComments;

/// Minimum role, besides ownership, needed to edit someone else's post.
pub const UPDATE_ANY_POST_ROLE: Role = Role::Moderator;

/// Minimum role, besides ownership, needed to delete someone else's post.
pub const DELETE_ANY_POST_ROLE: Role = Role::Admin;

/// Owners may always act on their own post; others need `required` or above.
pub fn authorize(principal: &Principal, post: &Post, required: Role) -> ApiResult<()> {
    if post.user_id == principal.user_id() || principal.has_role_at_least(required) {
        return Ok(());
    }
    tracing::debug!(
        user_id = principal.user_id(),
        post_id = post.id,
        required = required.name(),
        "Post access denied"
    );
    Err(ApiError::forbidden("Insufficient permissions for this post"))
}

#[derive(Clone)]
pub struct OptimisticVersionStore {
    posts: Arc<dyn PostStore>,
    store_timeout: Duration,
}

impl std::fmt::Debug for OptimisticVersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimisticVersionStore")
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl OptimisticVersionStore {
    pub fn new(posts: Arc<dyn PostStore>, store_timeout: Duration) -> Self {
        Self {
            posts,
            store_timeout,
        }
    }

    pub async fn create(
        &self,
        principal: &Principal,
        title: String,
        content: String,
        tags: Vec<String>,
    ) -> ApiResult<Post> {
        let new_post = NewPost {
            title,
            content,
            user_id: principal.user_id(),
            tags,
        };
        let post = with_deadline("post_insert", self.store_timeout, self.posts.post_insert(&new_post)).await?;
        tracing::info!(post_id = post.id, user_id = post.user_id, "Post created");
        Ok(post)
    }

    pub async fn get(&self, id: PostId) -> ApiResult<Post> {
        with_deadline("post_get", self.store_timeout, self.posts.post_get(id))
            .await?
            .ok_or_else(|| StorageError::post_not_found(id).into())
    }

    /// A post and its comments, newest comment first.
    pub async fn get_with_comments(&self, id: PostId) -> ApiResult<PostWithComments> {
        let post = self.get(id).await?;
        let comments = with_deadline(
            "comments_for_post",
            self.store_timeout,
            self.posts.comments_for_post(id),
        )
        .await?;
        Ok(PostWithComments { post, comments })
    }

    /// Any active user may comment on any post.
    pub async fn comment(&self, principal: &Principal, post_id: PostId, content: String) -> ApiResult<Comment> {
        let new_comment = NewComment {
            post_id,
            user_id: principal.user_id(),
            content,
        };
        let comment = with_deadline(
            "comment_insert",
            self.store_timeout,
            self.posts.comment_insert(&new_comment),
        )
        .await?;
        tracing::info!(comment_id = comment.id, post_id, user_id = comment.user_id, "Comment added");
        Ok(comment)
    }

    /// Write `post`'s title and content if the stored version is still
    /// `expected_version`. Returns the new version.
    pub async fn update_post(&self, post: &Post, expected_version: i32) -> ApiResult<i32> {
        let changes = PostChanges {
            title: Some(post.title.clone()),
            content: Some(post.content.clone()),
        };
        let version = with_deadline(
            "post_update_versioned",
            self.store_timeout,
            self.posts.post_update_versioned(post.id, &changes, expected_version),
        )
        .await
        .inspect_err(|e| {
            if matches!(e, StorageError::VersionConflict { .. }) {
                tracing::debug!(post_id = post.id, expected_version, "Post version conflict");
            }
        })?;
        Ok(version)
    }

    /// Load, authorize, apply `changes` and write them against `expected_version`.
    pub async fn edit(
        &self,
        principal: &Principal,
        id: PostId,
        changes: &PostChanges,
        expected_version: i32,
    ) -> ApiResult<Post> {
        let mut post = self.get(id).await?;
        authorize(principal, &post, UPDATE_ANY_POST_ROLE)?;

        changes.apply_to(&mut post);
        post.version = self.update_post(&post, expected_version).await?;
        Ok(post)
    }

    pub async fn delete(&self, principal: &Principal, id: PostId) -> ApiResult<()> {
        let post = self.get(id).await?;
        authorize(principal, &post, DELETE_ANY_POST_ROLE)?;

        with_deadline("post_delete", self.store_timeout, self.posts.post_delete(id)).await?;
        tracing::info!(post_id = id, user_id = principal.user_id(), "Post deleted");
        Ok(())
    }
}
