//! In-memory storage for tests and local development.
//!
//! All tables sit behind a single lock, so every trait method is atomic the
//! same way a database transaction is: concurrent callers observe either
//! none or all of its effects.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use agora_core::{
    Comment, CommentAuthor, CommentId, FeedItem, FeedQuery, FeedSort, Invitation, NewComment,
    NewInvitation, NewPost, NewUser, Post, PostChanges, PostId, RoleId, StorageError,
    StorageResult, Timestamp, TokenHash, UniqueConstraint, User, UserId, INITIAL_POST_VERSION,
};
use async_trait::async_trait;
use chrono::Utc;

use crate::store::{PostStore, UserStore};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    invitations: HashMap<TokenHash, Invitation>,
    posts: HashMap<PostId, Post>,
    comments: HashMap<CommentId, Comment>,
    /// (follower, followee)
    follows: HashSet<(UserId, UserId)>,
    next_user_id: UserId,
    next_post_id: PostId,
    next_comment_id: CommentId,
}

impl Tables {
    /// Drop everything hanging off a post.
    fn remove_post(&mut self, id: PostId) -> Option<Post> {
        self.comments.retain(|_, c| c.post_id != id);
        self.posts.remove(&id)
    }
}

/// Mock storage with transactional semantics and fault injection.
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MockStorage {
    tables: Arc<RwLock<Tables>>,
    fail_user_delete: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
    insert_ack_delay_ms: Arc<AtomicU64>,
}

impl MockStorage {
    /// Create a new mock storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `user_delete` fail with a backend error.
    pub fn fail_user_deletes(&self, fail: bool) {
        self.fail_user_delete.store(fail, Ordering::SeqCst);
    }

    /// Delay every operation by `latency` before it touches the tables.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Hold `user_insert_with_invitation` for `delay` after it has committed,
    /// as a database does when the acknowledgement is slow to come back.
    pub fn delay_after_user_insert(&self, delay: Duration) {
        self.insert_ack_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn user_count(&self) -> usize {
        self.read().map(|t| t.users.len()).unwrap_or(0)
    }

    pub fn invitation_count(&self) -> usize {
        self.read().map(|t| t.invitations.len()).unwrap_or(0)
    }

    pub fn post_count(&self) -> usize {
        self.read().map(|t| t.posts.len()).unwrap_or(0)
    }

    pub fn comment_count(&self) -> usize {
        self.read().map(|t| t.comments.len()).unwrap_or(0)
    }

    pub fn follows(&self, follower: UserId, followee: UserId) -> bool {
        self.read()
            .map(|t| t.follows.contains(&(follower, followee)))
            .unwrap_or(false)
    }

    /// Invitation currently held for a user, if any.
    pub fn invitation_for(&self, user_id: UserId) -> Option<Invitation> {
        self.read().ok().and_then(|t| {
            t.invitations
                .values()
                .find(|inv| inv.user_id == user_id)
                .cloned()
        })
    }

    /// Change a user's role directly.
    pub fn set_user_role(&self, id: UserId, role_id: RoleId) -> StorageResult<()> {
        let mut tables = self.write()?;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StorageError::user_not_found(id))?;
        user.role_id = role_id;
        Ok(())
    }

    /// Move an invitation's expiry, e.g. into the past.
    pub fn set_invitation_expiry(&self, user_id: UserId, expires_at: Timestamp) -> StorageResult<()> {
        let mut tables = self.write()?;
        for invitation in tables.invitations.values_mut() {
            if invitation.user_id == user_id {
                invitation.expires_at = expires_at;
            }
        }
        Ok(())
    }

    fn insert_user_locked(&self, user: &NewUser, invitation: &NewInvitation) -> StorageResult<User> {
        let mut tables = self.write()?;

        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StorageError::UniqueViolation {
                constraint: UniqueConstraint::UserEmail,
            });
        }
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StorageError::UniqueViolation {
                constraint: UniqueConstraint::UserUsername,
            });
        }
        if tables.invitations.contains_key(&invitation.token_hash) {
            return Err(StorageError::UniqueViolation {
                constraint: UniqueConstraint::Other("user_invitations_pkey".to_string()),
            });
        }

        tables.next_user_id += 1;
        let created = User {
            id: tables.next_user_id,
            username: user.username.clone(),
            email: user.email.clone(),
            password: user.password.clone(),
            is_active: false,
            role_id: user.role_id,
            created_at: Utc::now(),
        };
        tables.users.insert(created.id, created.clone());
        tables.invitations.insert(
            invitation.token_hash.clone(),
            Invitation {
                token_hash: invitation.token_hash.clone(),
                user_id: created.id,
                expires_at: invitation.expires_at,
            },
        );
        Ok(created)
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::backend("mock storage lock poisoned"))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::backend("mock storage lock poisoned"))
    }

    async fn simulate_latency(&self) {
        sleep_ms(self.latency_ms.load(Ordering::SeqCst)).await;
    }
}

async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl UserStore for MockStorage {
    async fn user_insert_with_invitation(
        &self,
        user: &NewUser,
        invitation: &NewInvitation,
    ) -> StorageResult<User> {
        self.simulate_latency().await;
        let created = self.insert_user_locked(user, invitation)?;
        sleep_ms(self.insert_ack_delay_ms.load(Ordering::SeqCst)).await;
        Ok(created)
    }

    async fn user_activate(&self, token_hash: &TokenHash, now: Timestamp) -> StorageResult<User> {
        self.simulate_latency().await;
        let mut tables = self.write()?;

        let user_id = match tables.invitations.get(token_hash) {
            Some(invitation) if invitation.is_live_at(now) => invitation.user_id,
            _ => return Err(StorageError::invitation_not_found()),
        };
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Err(StorageError::invitation_not_found());
        };
        user.is_active = true;
        let activated = user.clone();
        tables.invitations.remove(token_hash);
        Ok(activated)
    }

    async fn user_delete(&self, id: UserId) -> StorageResult<()> {
        self.simulate_latency().await;
        if self.fail_user_delete.load(Ordering::SeqCst) {
            return Err(StorageError::backend("injected user_delete failure"));
        }
        let mut tables = self.write()?;
        if tables.users.remove(&id).is_none() {
            return Err(StorageError::user_not_found(id));
        }
        tables.invitations.retain(|_, inv| inv.user_id != id);
        tables.follows.retain(|(a, b)| *a != id && *b != id);
        tables.comments.retain(|_, c| c.user_id != id);
        let owned: Vec<PostId> = tables
            .posts
            .values()
            .filter(|p| p.user_id == id)
            .map(|p| p.id)
            .collect();
        for post_id in owned {
            tables.remove_post(post_id);
        }
        Ok(())
    }

    async fn user_get(&self, id: UserId) -> StorageResult<Option<User>> {
        self.simulate_latency().await;
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn user_get_active_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        self.simulate_latency().await;
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.is_active && u.email == email)
            .cloned())
    }

    async fn user_get_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        self.simulate_latency().await;
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn user_follow(&self, follower: UserId, followee: UserId) -> StorageResult<()> {
        self.simulate_latency().await;
        let mut tables = self.write()?;
        for id in [follower, followee] {
            if !tables.users.contains_key(&id) {
                return Err(StorageError::user_not_found(id));
            }
        }
        if !tables.follows.insert((follower, followee)) {
            return Err(StorageError::UniqueViolation {
                constraint: UniqueConstraint::Follow,
            });
        }
        Ok(())
    }

    async fn user_unfollow(&self, follower: UserId, followee: UserId) -> StorageResult<()> {
        self.simulate_latency().await;
        if self.write()?.follows.remove(&(follower, followee)) {
            Ok(())
        } else {
            Err(StorageError::follow_not_found(follower, followee))
        }
    }
}

#[async_trait]
impl PostStore for MockStorage {
    async fn post_insert(&self, post: &NewPost) -> StorageResult<Post> {
        self.simulate_latency().await;
        let mut tables = self.write()?;
        tables.next_post_id += 1;
        let now = Utc::now();
        let created = Post {
            id: tables.next_post_id,
            title: post.title.clone(),
            content: post.content.clone(),
            user_id: post.user_id,
            tags: post.tags.clone(),
            version: INITIAL_POST_VERSION,
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn post_get(&self, id: PostId) -> StorageResult<Option<Post>> {
        self.simulate_latency().await;
        Ok(self.read()?.posts.get(&id).cloned())
    }

    async fn post_update_versioned(
        &self,
        id: PostId,
        changes: &PostChanges,
        expected_version: i32,
    ) -> StorageResult<i32> {
        self.simulate_latency().await;
        let mut tables = self.write()?;
        let post = tables
            .posts
            .get_mut(&id)
            .ok_or_else(|| StorageError::post_not_found(id))?;
        if post.version != expected_version {
            return Err(StorageError::VersionConflict {
                id,
                expected: expected_version,
            });
        }
        changes.apply_to(post);
        post.version += 1;
        post.updated_at = Utc::now();
        Ok(post.version)
    }

    async fn post_delete(&self, id: PostId) -> StorageResult<()> {
        self.simulate_latency().await;
        match self.write()?.remove_post(id) {
            Some(_) => Ok(()),
            None => Err(StorageError::post_not_found(id)),
        }
    }

    async fn comment_insert(&self, comment: &NewComment) -> StorageResult<Comment> {
        self.simulate_latency().await;
        let mut tables = self.write()?;
        if !tables.posts.contains_key(&comment.post_id) {
            return Err(StorageError::post_not_found(comment.post_id));
        }
        let username = tables
            .users
            .get(&comment.user_id)
            .map(|u| u.username.clone())
            .ok_or_else(|| StorageError::user_not_found(comment.user_id))?;
        tables.next_comment_id += 1;
        let created = Comment {
            id: tables.next_comment_id,
            post_id: comment.post_id,
            user_id: comment.user_id,
            content: comment.content.clone(),
            created_at: Utc::now(),
            user: CommentAuthor {
                id: comment.user_id,
                username,
            },
        };
        tables.comments.insert(created.id, created.clone());
        Ok(created)
    }

    async fn comments_for_post(&self, post_id: PostId) -> StorageResult<Vec<Comment>> {
        self.simulate_latency().await;
        let tables = self.read()?;
        let mut comments: Vec<Comment> = tables
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(comments)
    }

    async fn post_feed(&self, viewer: UserId, query: &FeedQuery) -> StorageResult<Vec<FeedItem>> {
        self.simulate_latency().await;
        let tables = self.read()?;
        let mut posts: Vec<&Post> = tables
            .posts
            .values()
            .filter(|p| p.user_id == viewer || tables.follows.contains(&(viewer, p.user_id)))
            .filter(|p| query.matches(p))
            .collect();
        posts.sort_by_key(|p| (p.created_at, p.id));
        if query.sort == FeedSort::Desc {
            posts.reverse();
        }

        let offset = usize::try_from(query.offset).unwrap_or(0);
        let limit = usize::try_from(query.limit).unwrap_or(0);
        let items = posts
            .into_iter()
            .filter_map(|p| {
                let author = tables.users.get(&p.user_id)?;
                let comments_count =
                    tables.comments.values().filter(|c| c.post_id == p.id).count() as i64;
                Some(FeedItem {
                    post: p.clone(),
                    username: author.username.clone(),
                    comments_count,
                })
            })
            .skip(offset)
            .take(limit)
            .collect();
        Ok(items)
    }
}
