//! User Lifecycle Coordinator
//!
//! Registration, activation and the compensating delete.
//!
//! ```text
//! Unregistered --register--> PendingActivation --activate--> Active
//!                                   |
//!                                   +--mail failed--> Deleted
//! ```
//!
//! The user row and its invitation are written in one store transaction.
//! The invitation mail is sent after commit; if it fails the user is deleted
//! once (no retry) and the mail failure is returned.
//!
//! A registration whose insert times out may still have committed. The
//! coordinator then looks the account up by email and, if it is the row this
//! call wrote (same salted password hash, still inactive), deletes it before
//! returning the timeout. No invitation mail is sent in that case.

use agora_core::{
    ActivationToken, MailTemplate, Mailer, NewInvitation, NewUser, OutboundMail, Password, User,
    UserId,
};
use agora_core::StorageError;
use agora_storage::{with_deadline, UserStore};
use chrono::Utc;
use std::sync::Arc;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::services::identity::IdentityService;

/// Profile fields supplied at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterUser {
    pub username: String,
    pub email: String,
}

/// A committed, notified registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    /// Plaintext token; only its hash is stored.
    pub activation_token: ActivationToken,
}

#[derive(Clone)]
pub struct UserLifecycleCoordinator {
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    identity: IdentityService,
    config: Arc<ApiConfig>,
}

impl std::fmt::Debug for UserLifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserLifecycleCoordinator")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl UserLifecycleCoordinator {
    pub fn new(
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        identity: IdentityService,
        config: Arc<ApiConfig>,
    ) -> Self {
        Self {
            users,
            mailer,
            identity,
            config,
        }
    }

    /// Create an inactive user with a live invitation and mail the activation link.
    pub async fn register(&self, profile: RegisterUser, raw_password: &str) -> ApiResult<Registration> {
        let plaintext = raw_password.to_string();
        let password = tokio::task::spawn_blocking(move || Password::from_plaintext(&plaintext))
            .await
            .map_err(|e| ApiError::internal_error(format!("Password hashing aborted: {}", e)))?
            .map_err(|e| {
                tracing::error!(error = %e, "Password hashing failed");
                ApiError::internal_error("Failed to process password")
            })?;

        let token = ActivationToken::generate();
        let expiry = chrono::Duration::from_std(self.config.invitation_expiry)
            .map_err(|e| ApiError::internal_error(format!("Invalid invitation expiry: {}", e)))?;
        let invitation = NewInvitation {
            token_hash: token.hash(),
            expires_at: Utc::now() + expiry,
        };
        let new_user = NewUser::new(profile.username, profile.email, password);

        let inserted = with_deadline(
            "user_insert_with_invitation",
            self.config.store_timeout,
            self.users.user_insert_with_invitation(&new_user, &invitation),
        )
        .await;
        let user = match inserted {
            Ok(user) => user,
            Err(err @ StorageError::Timeout { .. }) => {
                self.reclaim_unacknowledged(&new_user).await;
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        let mail = OutboundMail::new(MailTemplate::UserInvitation, &user.username, &user.email)
            .with_var("username", &user.username)
            .with_var("activation_url", self.config.activation_url(token.expose()))
            .with_sandbox(!self.config.is_production());

        if let Err(e) = self.mailer.send(&mail).await {
            tracing::error!(error = %e, user_id = user.id, "Invitation delivery failed, removing user");
            self.compensate(user.id).await;
            return Err(ApiError::internal_error("Failed to send invitation email"));
        }

        tracing::info!(user_id = user.id, "User registered, invitation sent");
        Ok(Registration {
            user,
            activation_token: token,
        })
    }

    /// Activate the user holding a live invitation for `presented_token`.
    ///
    /// Wrong and expired tokens are both `EntityNotFound`. The invitation is
    /// consumed by the same transaction, so a token works once.
    pub async fn activate(&self, presented_token: &str) -> ApiResult<UserId> {
        let token_hash = ActivationToken::from_presented(presented_token).hash();
        let user = with_deadline(
            "user_activate",
            self.config.store_timeout,
            self.users.user_activate(&token_hash, Utc::now()),
        )
        .await?;

        self.identity.invalidate(user.id).await;
        tracing::info!(user_id = user.id, "User activated");
        Ok(user.id)
    }

    /// Remove a user and any remaining invitation.
    pub async fn delete(&self, user_id: UserId) -> ApiResult<()> {
        with_deadline(
            "user_delete",
            self.config.store_timeout,
            self.users.user_delete(user_id),
        )
        .await?;
        self.identity.invalidate(user_id).await;
        Ok(())
    }

    /// Remove the row a timed-out insert may have committed anyway.
    async fn reclaim_unacknowledged(&self, new_user: &NewUser) {
        let found = with_deadline(
            "user_get_by_email",
            self.config.store_timeout,
            self.users.user_get_by_email(&new_user.email),
        )
        .await;

        match found {
            Ok(Some(user))
                if !user.is_active
                    && user.username == new_user.username
                    && user.password.hash().is_some()
                    && user.password.hash() == new_user.password.hash() =>
            {
                tracing::warn!(user_id = user.id, "Insert committed after timeout, removing user");
                self.compensate(user.id).await;
            }
            Ok(_) => tracing::debug!("Timed-out insert left no user behind"),
            Err(e) => tracing::error!(
                error = %e,
                "Could not check for a user left by a timed-out insert"
            ),
        }
    }

    /// Single best-effort delete after a failed delivery. Failure is only logged.
    async fn compensate(&self, user_id: UserId) {
        match self.delete(user_id).await {
            Ok(()) => tracing::info!(user_id, "Compensating delete completed"),
            Err(e) => tracing::error!(
                error = %e,
                user_id,
                "Compensating delete failed, inactive user left without invitation mail"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use agora_storage::{CacheAsideStore, CacheConfig, InMemoryCacheBackend, MockStorage};
    use agora_test_utils::RecordingMailer;
    use std::time::Duration;

    fn coordinator(storage: &MockStorage, mailer: &RecordingMailer) -> UserLifecycleCoordinator {
        let users: Arc<dyn UserStore> = Arc::new(storage.clone());
        let identity = IdentityService::new(Arc::clone(&users), None, Duration::from_secs(5));
        UserLifecycleCoordinator::new(
            users,
            Arc::new(mailer.clone()),
            identity,
            Arc::new(ApiConfig::default()),
        )
    }

    /// Coordinator whose identity service reads through a live in-memory cache.
    fn cached_coordinator(
        storage: &MockStorage,
        mailer: &RecordingMailer,
    ) -> (UserLifecycleCoordinator, IdentityService) {
        let users: Arc<dyn UserStore> = Arc::new(storage.clone());
        let cache = CacheAsideStore::new(Arc::new(InMemoryCacheBackend::new()), CacheConfig::default());
        let identity = IdentityService::new(Arc::clone(&users), Some(cache), Duration::from_secs(5));
        let coordinator = UserLifecycleCoordinator::new(
            users,
            Arc::new(mailer.clone()),
            identity.clone(),
            Arc::new(ApiConfig::default()),
        );
        (coordinator, identity)
    }

    fn profile(name: &str) -> RegisterUser {
        RegisterUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
        }
    }

    #[tokio::test]
    async fn test_register_sends_activation_link() {
        let storage = MockStorage::new();
        let mailer = RecordingMailer::new();
        let registration = coordinator(&storage, &mailer)
            .register(profile("ada"), "secret")
            .await
            .expect("register");

        assert!(!registration.user.is_active);
        assert_eq!(storage.user_count(), 1);
        assert_eq!(storage.invitation_count(), 1);

        let mail = mailer.last().expect("mail sent");
        assert_eq!(mail.recipient_email, "ada@example.com");
        assert!(mail.sandbox);
        assert_eq!(
            mailer.last_activation_token().as_deref(),
            Some(registration.activation_token.expose())
        );
    }

    #[tokio::test]
    async fn test_register_never_stores_plaintext() {
        let storage = MockStorage::new();
        let mailer = RecordingMailer::new();
        let registration = coordinator(&storage, &mailer)
            .register(profile("ada"), "secret")
            .await
            .expect("register");

        let invitation = storage
            .invitation_for(registration.user.id)
            .expect("invitation");
        assert_ne!(invitation.token_hash.as_str(), registration.activation_token.expose());
        assert_ne!(registration.user.password.hash(), Some("secret"));
        assert!(registration.user.password.verify("secret"));
    }

    #[tokio::test]
    async fn test_mail_failure_compensates() {
        let storage = MockStorage::new();
        let mailer = RecordingMailer::failing();
        let err = coordinator(&storage, &mailer)
            .register(profile("ada"), "secret")
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(storage.user_count(), 0);
        assert_eq!(storage.invitation_count(), 0);
        assert_eq!(mailer.attempts(), 1);
    }

    #[tokio::test]
    async fn test_failed_compensation_still_reports_mail_error() {
        let storage = MockStorage::new();
        storage.fail_user_deletes(true);
        let mailer = RecordingMailer::failing();
        let err = coordinator(&storage, &mailer)
            .register(profile("ada"), "secret")
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(storage.user_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicates_are_distinguished() {
        let storage = MockStorage::new();
        let mailer = RecordingMailer::new();
        let coordinator = coordinator(&storage, &mailer);
        coordinator.register(profile("ada"), "secret").await.expect("first");

        let dup_email = coordinator
            .register(
                RegisterUser {
                    username: "other".into(),
                    email: "ada@example.com".into(),
                },
                "secret",
            )
            .await
            .unwrap_err();
        assert_eq!(dup_email.code, ErrorCode::DuplicateEmail);

        let dup_username = coordinator
            .register(
                RegisterUser {
                    username: "ada".into(),
                    email: "new@example.com".into(),
                },
                "secret",
            )
            .await
            .unwrap_err();
        assert_eq!(dup_username.code, ErrorCode::DuplicateUsername);
        assert_eq!(storage.user_count(), 1);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_activation_is_single_use() {
        let storage = MockStorage::new();
        let mailer = RecordingMailer::new();
        let coordinator = coordinator(&storage, &mailer);
        let registration = coordinator.register(profile("ada"), "secret").await.expect("register");
        let token = registration.activation_token.expose().to_string();

        let user_id = coordinator.activate(&token).await.expect("activate");
        assert_eq!(user_id, registration.user.id);
        assert_eq!(storage.invitation_count(), 0);

        let err = coordinator.activate(&token).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EntityNotFound);
    }

    #[tokio::test]
    async fn test_concurrent_activations_have_one_winner() {
        let storage = MockStorage::new();
        let mailer = RecordingMailer::new();
        let coordinator = coordinator(&storage, &mailer);
        let registration = coordinator.register(profile("ada"), "secret").await.expect("register");
        let token = registration.activation_token.expose().to_string();

        // Both calls are in flight before either reaches the tables.
        storage.set_latency(Duration::from_millis(10));
        let (first, second) = tokio::join!(coordinator.activate(&token), coordinator.activate(&token));

        let outcomes = [first, second];
        let winners: Vec<UserId> = outcomes.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        let losers: Vec<ErrorCode> = outcomes
            .iter()
            .filter_map(|r| r.as_ref().err().map(|e| e.code))
            .collect();
        assert_eq!(winners, [registration.user.id]);
        assert_eq!(losers, [ErrorCode::EntityNotFound]);
        assert_eq!(storage.invitation_count(), 0);
    }

    #[tokio::test]
    async fn test_activation_evicts_cached_inactive_user() {
        let storage = MockStorage::new();
        let mailer = RecordingMailer::new();
        let (coordinator, identity) = cached_coordinator(&storage, &mailer);
        let registration = coordinator.register(profile("ada"), "secret").await.expect("register");
        let user_id = registration.user.id;

        let before = identity.load_user(user_id).await.expect("load");
        assert!(!before.is_active);
        let cache = identity.cache().expect("cache enabled");
        assert!(cache.get(&user_id).await.is_some());

        coordinator
            .activate(registration.activation_token.expose())
            .await
            .expect("activate");
        assert!(cache.get(&user_id).await.is_none());

        let after = identity.load_user(user_id).await.expect("reload");
        assert!(after.is_active);
    }

    #[tokio::test]
    async fn test_delete_evicts_cached_user() {
        let storage = MockStorage::new();
        let mailer = RecordingMailer::new();
        let (coordinator, identity) = cached_coordinator(&storage, &mailer);
        let registration = coordinator.register(profile("ada"), "secret").await.expect("register");
        let user_id = registration.user.id;
        coordinator
            .activate(registration.activation_token.expose())
            .await
            .expect("activate");

        identity.load_user(user_id).await.expect("warm cache");
        coordinator.delete(user_id).await.expect("delete");

        let err = identity.load_user(user_id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EntityNotFound);
    }

    #[tokio::test]
    async fn test_expired_token_is_not_found() {
        let storage = MockStorage::new();
        let mailer = RecordingMailer::new();
        let coordinator = coordinator(&storage, &mailer);
        let registration = coordinator.register(profile("ada"), "secret").await.expect("register");
        storage
            .set_invitation_expiry(registration.user.id, Utc::now() - chrono::Duration::seconds(1))
            .expect("expire invitation");

        let err = coordinator
            .activate(registration.activation_token.expose())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::EntityNotFound);
    }

    #[tokio::test]
    async fn test_store_timeout_surfaces() {
        let storage = MockStorage::new();
        storage.set_latency(Duration::from_millis(200));
        let mailer = RecordingMailer::new();
        let users: Arc<dyn UserStore> = Arc::new(storage.clone());
        let coordinator = UserLifecycleCoordinator::new(
            Arc::clone(&users),
            Arc::new(mailer.clone()),
            IdentityService::new(users, None, Duration::from_millis(20)),
            Arc::new(ApiConfig {
                store_timeout: Duration::from_millis(20),
                ..ApiConfig::default()
            }),
        );

        let err = coordinator.register(profile("ada"), "secret").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_insert_committed_after_timeout_is_rolled_back() {
        let storage = MockStorage::new();
        storage.delay_after_user_insert(Duration::from_millis(200));
        let mailer = RecordingMailer::new();
        let users: Arc<dyn UserStore> = Arc::new(storage.clone());
        let coordinator = UserLifecycleCoordinator::new(
            Arc::clone(&users),
            Arc::new(mailer.clone()),
            IdentityService::new(users, None, Duration::from_millis(20)),
            Arc::new(ApiConfig {
                store_timeout: Duration::from_millis(20),
                ..ApiConfig::default()
            }),
        );

        let err = coordinator.register(profile("ada"), "secret").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
        assert_eq!(storage.user_count(), 0);
        assert_eq!(storage.invitation_count(), 0);
        assert_eq!(mailer.attempts(), 0);

        // The profile is free again once the store answers promptly.
        storage.delay_after_user_insert(Duration::ZERO);
        coordinator
            .register(profile("ada"), "secret")
            .await
            .expect("retry registers");
        assert_eq!(storage.user_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_does_not_remove_someone_elses_account() {
        let storage = MockStorage::new();
        let mailer = RecordingMailer::new();
        let users: Arc<dyn UserStore> = Arc::new(storage.clone());
        let config = Arc::new(ApiConfig {
            store_timeout: Duration::from_millis(20),
            ..ApiConfig::default()
        });
        let coordinator = UserLifecycleCoordinator::new(
            Arc::clone(&users),
            Arc::new(mailer.clone()),
            IdentityService::new(Arc::clone(&users), None, config.store_timeout),
            Arc::clone(&config),
        );
        coordinator.register(profile("ada"), "secret").await.expect("first");

        // A second attempt for the same profile times out before it could
        // have committed; the existing account must survive the cleanup.
        storage.set_latency(Duration::from_millis(200));
        let err = coordinator.register(profile("ada"), "secret").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
        storage.set_latency(Duration::ZERO);
        assert_eq!(storage.user_count(), 1);
    }
}
