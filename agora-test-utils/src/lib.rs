//! Agora Test Utilities
//!
//! Shared test infrastructure for the Agora workspace:
//! - Test doubles for the mail and cache seams
//! - Proptest generators
//! - Fixtures for common scenarios

// Re-export mock storage from its source crate
pub use agora_storage::MockStorage;

pub use agora_core::{
    ActivationToken, MailError, MailTemplate, Mailer, NewInvitation, NewPost, NewUser,
    OutboundMail, Password, Post, Role, StorageError, User, UserId,
};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agora_storage::{CacheBackend, CacheError, CacheStats, CachedBytes};
use async_trait::async_trait;

// ============================================================================
// MAIL DOUBLES
// ============================================================================

/// Mailer that records every message it is asked to send.
///
/// Clones share the same outbox. Call [`RecordingMailer::fail_sends`] to make
/// subsequent sends fail; failed attempts are still counted.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<OutboundMail>>>,
    attempts: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer that rejects every send.
    pub fn failing() -> Self {
        let mailer = Self::default();
        mailer.fail_sends(true);
        mailer
    }

    pub fn fail_sends(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    /// Successfully delivered messages, oldest first.
    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<OutboundMail> {
        self.sent().pop()
    }

    /// The activation token embedded in the most recent invitation link.
    pub fn last_activation_token(&self) -> Option<String> {
        let mail = self.last()?;
        let url = mail.var("activation_url")?;
        url.rsplit('/').next().map(str::to_string)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::SendFailed("recording mailer set to fail".into()));
        }
        self.sent
            .lock()
            .map_err(|_| MailError::SendFailed("outbox lock poisoned".into()))?
            .push(mail.clone());
        Ok(())
    }
}

// ============================================================================
// CACHE DOUBLES
// ============================================================================

/// Cache backend whose every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingCacheBackend;

#[async_trait]
impl CacheBackend for FailingCacheBackend {
    async fn get(&self, _key: &str) -> Result<Option<CachedBytes>, CacheError> {
        Err(CacheError::Unavailable("injected failure".into()))
    }

    async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("injected failure".into()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("injected failure".into()))
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        Err(CacheError::Unavailable("injected failure".into()))
    }
}

/// Cache backend that sleeps before delegating, for timeout tests.
pub struct SlowCacheBackend<B> {
    inner: B,
    delay: Duration,
}

impl<B: CacheBackend> SlowCacheBackend<B> {
    pub fn new(inner: B, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<B: CacheBackend> CacheBackend for SlowCacheBackend<B> {
    async fn get(&self, key: &str) -> Result<Option<CachedBytes>, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(key).await
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        self.inner.stats().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Agora inputs.

    use proptest::prelude::*;

    /// Usernames accepted by registration.
    pub fn arb_username() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{2,19}"
    }

    /// Email addresses accepted by registration.
    pub fn arb_email() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9.]{0,15}", "[a-z]{2,10}", "(com|org|net|io)")
            .prop_map(|(local, domain, tld)| format!("{local}@{domain}.{tld}"))
    }

    /// Passwords within the accepted length range.
    pub fn arb_password() -> impl Strategy<Value = String> {
        "[ -~]{3,72}"
    }

    /// Client keys as the rate limiter sees them (IPv4 addresses).
    pub fn arb_client_key() -> impl Strategy<Value = String> {
        any::<[u8; 4]>().prop_map(|o| format!("{}.{}.{}.{}", o[0], o[1], o[2], o[3]))
    }

    /// Post titles within the accepted length.
    pub fn arb_title() -> impl Strategy<Value = String> {
        "[A-Za-z0-9 ]{1,100}"
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common scenarios.

    use super::*;
    use agora_storage::{PostStore, UserStore};
    use chrono::{Duration as ChronoDuration, Utc};

    /// Plaintext password used by [`seed_active_user`].
    pub const TEST_PASSWORD: &str = "correct-horse";

    /// An unsaved user snapshot, as the cache would hold it.
    pub fn sample_user(id: UserId) -> User {
        User {
            id,
            username: format!("user{id}"),
            email: format!("user{id}@example.com"),
            password: Password::default(),
            is_active: true,
            role_id: Role::User.id(),
            created_at: Utc::now(),
        }
    }

    /// Insert and activate a user with [`TEST_PASSWORD`] and the given role.
    pub async fn seed_active_user(storage: &MockStorage, username: &str, role: Role) -> User {
        let token = ActivationToken::generate();
        let password = Password::from_plaintext(TEST_PASSWORD).expect("hash test password");
        let new_user = NewUser::new(username, format!("{username}@example.com"), password);
        let invitation = NewInvitation {
            token_hash: token.hash(),
            expires_at: Utc::now() + ChronoDuration::hours(1),
        };
        let user = storage
            .user_insert_with_invitation(&new_user, &invitation)
            .await
            .expect("seed user");
        storage
            .set_user_role(user.id, role.id())
            .expect("set seed role");
        storage
            .user_activate(&token.hash(), Utc::now())
            .await
            .expect("activate seed user")
    }

    /// Insert a post owned by `user_id`.
    pub async fn seed_post(storage: &MockStorage, user_id: UserId) -> Post {
        storage
            .post_insert(&NewPost {
                title: "First post".to_string(),
                content: "Hello, Agora".to_string(),
                user_id,
                tags: vec!["intro".to_string()],
            })
            .await
            .expect("seed post")
    }
}
