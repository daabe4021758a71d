//! Feed Service
//!
//! The follow graph and the per-user feed built from it.

use agora_core::{FeedItem, FeedQuery, UserId};
use agora_storage::{with_deadline, PostStore, UserStore};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::services::identity::IdentityService;

#[derive(Clone)]
pub struct FeedService {
    users: Arc<dyn UserStore>,
    posts: Arc<dyn PostStore>,
    identity: IdentityService,
    store_timeout: Duration,
}

impl std::fmt::Debug for FeedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedService")
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl FeedService {
    pub fn new(
        users: Arc<dyn UserStore>,
        posts: Arc<dyn PostStore>,
        identity: IdentityService,
        store_timeout: Duration,
    ) -> Self {
        Self {
            users,
            posts,
            identity,
            store_timeout,
        }
    }

    /// Follow an existing, active user.
    pub async fn follow(&self, principal: &Principal, target: UserId) -> ApiResult<()> {
        if target == principal.user_id() {
            return Err(ApiError::invalid_input("Users cannot follow themselves"));
        }
        let followee = self.identity.load_user(target).await?;
        if !followee.is_active {
            return Err(ApiError::entity_not_found("User", target));
        }

        with_deadline(
            "user_follow",
            self.store_timeout,
            self.users.user_follow(principal.user_id(), target),
        )
        .await?;
        tracing::info!(follower = principal.user_id(), followee = target, "User followed");
        Ok(())
    }

    pub async fn unfollow(&self, principal: &Principal, target: UserId) -> ApiResult<()> {
        with_deadline(
            "user_unfollow",
            self.store_timeout,
            self.users.user_unfollow(principal.user_id(), target),
        )
        .await?;
        tracing::info!(follower = principal.user_id(), followee = target, "User unfollowed");
        Ok(())
    }

    /// One page of the caller's own posts and those of the users they follow.
    pub async fn feed(&self, principal: &Principal, query: &FeedQuery) -> ApiResult<Vec<FeedItem>> {
        let items = with_deadline(
            "post_feed",
            self.store_timeout,
            self.posts.post_feed(principal.user_id(), query),
        )
        .await?;
        tracing::debug!(
            user_id = principal.user_id(),
            returned = items.len(),
            limit = query.limit,
            offset = query.offset,
            "Feed served"
        );
        Ok(items)
    }
}
