//! Async store traits.
//!
//! Each multi-step operation here is a single atomic unit in the backing
//! store: implementations either commit all of it or none of it.

use agora_core::{
    Comment, FeedItem, FeedQuery, NewComment, NewInvitation, NewPost, NewUser, Post,
    PostChanges, PostId, StorageResult, Timestamp, TokenHash, User, UserId,
};
use async_trait::async_trait;

/// User accounts, their invitations and the follow graph.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert an inactive user and its invitation in one transaction.
    ///
    /// Fails with `UniqueViolation` naming the violated constraint when the
    /// email or username is taken; nothing is committed in that case.
    async fn user_insert_with_invitation(
        &self,
        user: &NewUser,
        invitation: &NewInvitation,
    ) -> StorageResult<User>;

    /// Consume the live invitation matching `token_hash` and activate its user.
    ///
    /// Fails with `NotFound` if no invitation with that hash expires after
    /// `now`. The invitation is deleted in the same transaction that flips
    /// the user active, so a token activates at most once.
    async fn user_activate(&self, token_hash: &TokenHash, now: Timestamp) -> StorageResult<User>;

    /// Delete a user and any remaining invitations in one transaction.
    async fn user_delete(&self, id: UserId) -> StorageResult<()>;

    async fn user_get(&self, id: UserId) -> StorageResult<Option<User>>;

    /// Look up an active account by email, for credential checks.
    async fn user_get_active_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    /// Look up an account by email regardless of activation state.
    async fn user_get_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    /// Record that `follower` follows `followee`.
    ///
    /// `NotFound` if either account is gone, `UniqueViolation` with
    /// [`agora_core::UniqueConstraint::Follow`] if the follow already exists.
    async fn user_follow(&self, follower: UserId, followee: UserId) -> StorageResult<()>;

    /// Remove a follow. `NotFound` if `follower` did not follow `followee`.
    async fn user_unfollow(&self, follower: UserId, followee: UserId) -> StorageResult<()>;
}

/// Posts with optimistic versioning, their comments and the feed.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn post_insert(&self, post: &NewPost) -> StorageResult<Post>;

    async fn post_get(&self, id: PostId) -> StorageResult<Option<Post>>;

    /// Apply `changes` only if the stored version equals `expected_version`.
    ///
    /// The comparison and the increment are one atomic write. Returns the new
    /// version, `VersionConflict` if another writer got there first, or
    /// `NotFound` if the post is gone. Never retries.
    async fn post_update_versioned(
        &self,
        id: PostId,
        changes: &PostChanges,
        expected_version: i32,
    ) -> StorageResult<i32>;

    /// Delete a post together with its comments.
    async fn post_delete(&self, id: PostId) -> StorageResult<()>;

    /// Attach a comment. `NotFound` if the post is gone.
    async fn comment_insert(&self, comment: &NewComment) -> StorageResult<Comment>;

    /// Comments on a post, newest first.
    async fn comments_for_post(&self, post_id: PostId) -> StorageResult<Vec<Comment>>;

    /// One page of `viewer`'s feed: their own posts and those of everyone
    /// they follow, filtered and ordered by `query`.
    async fn post_feed(&self, viewer: UserId, query: &FeedQuery) -> StorageResult<Vec<FeedItem>>;
}
