//! Identity Service
//!
//! Loads users for authenticated requests through the cache-aside path and
//! checks credentials for token issuance.

use agora_core::{StorageError, User, UserId};
use agora_storage::{with_deadline, CacheAsideStore, UserStore};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct IdentityService {
    users: Arc<dyn UserStore>,
    cache: Option<CacheAsideStore<User>>,
    store_timeout: Duration,
}

impl std::fmt::Debug for IdentityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityService")
            .field("cache", &self.cache)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl IdentityService {
    pub fn new(
        users: Arc<dyn UserStore>,
        cache: Option<CacheAsideStore<User>>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            users,
            cache,
            store_timeout,
        }
    }

    pub fn cache(&self) -> Option<&CacheAsideStore<User>> {
        self.cache.as_ref()
    }

    /// Load a user by id: cache first, then the store, then populate the cache.
    pub async fn load_user(&self, id: UserId) -> ApiResult<User> {
        if let Some(cache) = &self.cache {
            if let Some(user) = cache.get(&id).await {
                return Ok(user);
            }
        }

        let user = with_deadline("user_get", self.store_timeout, self.users.user_get(id))
            .await?
            .ok_or_else(|| StorageError::user_not_found(id))?;

        if let Some(cache) = &self.cache {
            cache.set(&user).await;
        }

        Ok(user)
    }

    /// Drop any cached copy of a user.
    pub async fn invalidate(&self, id: UserId) {
        if let Some(cache) = &self.cache {
            cache.invalidate(&id).await;
        }
    }

    /// Resolve an active user by email and password.
    ///
    /// Unknown email, inactive account and wrong password all produce the
    /// same `Unauthorized` error.
    pub async fn authenticate(&self, email: &str, password: &str) -> ApiResult<User> {
        let found = with_deadline(
            "user_get_active_by_email",
            self.store_timeout,
            self.users.user_get_active_by_email(email),
        )
        .await?;

        let Some(user) = found else {
            tracing::debug!("Token request for unknown or inactive account");
            return Err(invalid_credentials());
        };

        let credential = user.password.clone();
        let candidate = password.to_string();
        let verified = tokio::task::spawn_blocking(move || credential.verify(&candidate))
            .await
            .map_err(|e| ApiError::internal_error(format!("Password check aborted: {}", e)))?;

        if !verified {
            tracing::debug!(user_id = user.id, "Token request with wrong password");
            return Err(invalid_credentials());
        }

        Ok(user)
    }
}

fn invalid_credentials() -> ApiError {
    ApiError::unauthorized("Invalid credentials")
}
