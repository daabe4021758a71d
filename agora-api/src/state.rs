//! Shared application state for Axum routers.

use std::sync::Arc;

use agora_core::{Mailer, User};
use agora_storage::{
    CacheAsideStore, CacheBackend, InMemoryCacheBackend, LmdbCacheBackend, PostStore, UserStore,
};

use crate::auth::Authenticator;
use crate::config::{ApiConfig, CacheBackendKind, CacheSettings};
use crate::db::DbClient;
use crate::middleware::{AuthMiddlewareState, RateLimitState};
use crate::rate_limit::FixedWindowLimiter;
use crate::services::{
    FeedService, IdentityService, OptimisticVersionStore, UserLifecycleCoordinator,
};

/// Application-wide state shared across all routes.
#[derive(Debug, Clone)]
pub struct AppState {
    pub authenticator: Authenticator,
    /// Cache-aside user lookups. Also used by the auth middleware.
    pub identity: IdentityService,
    pub lifecycle: Arc<UserLifecycleCoordinator>,
    pub posts: OptimisticVersionStore,
    pub feeds: FeedService,
    /// Shared by the middleware and the sweep job.
    pub limiter: Arc<FixedWindowLimiter>,
    /// Only present when running against PostgreSQL; the health check pings it.
    pub db: Option<DbClient>,
    pub config: Arc<ApiConfig>,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire the services over the given stores.
    pub fn new(
        config: ApiConfig,
        authenticator: Authenticator,
        users: Arc<dyn UserStore>,
        posts: Arc<dyn PostStore>,
        mailer: Arc<dyn Mailer>,
        cache: Option<CacheAsideStore<User>>,
    ) -> Self {
        let config = Arc::new(config);
        let identity = IdentityService::new(users.clone(), cache, config.store_timeout);
        let feeds = FeedService::new(
            users.clone(),
            posts.clone(),
            identity.clone(),
            config.store_timeout,
        );
        let lifecycle = UserLifecycleCoordinator::new(users, mailer, identity.clone(), config.clone());
        let limiter = FixedWindowLimiter::new(config.rate_limit_requests, config.rate_limit_window);

        Self {
            authenticator,
            identity,
            lifecycle: Arc::new(lifecycle),
            posts: OptimisticVersionStore::new(posts, config.store_timeout),
            feeds,
            limiter: Arc::new(limiter),
            db: None,
            config,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_db(mut self, db: DbClient) -> Self {
        self.db = Some(db);
        self
    }

    pub fn auth_state(&self) -> AuthMiddlewareState {
        AuthMiddlewareState::new(self.authenticator.clone(), self.identity.clone())
    }

    pub fn rate_limit_state(&self) -> RateLimitState {
        RateLimitState::new(self.limiter.clone(), self.config.rate_limit_enabled)
    }
}

/// Open the identity cache described by `settings`.
///
/// An LMDB environment that cannot be opened falls back to the in-memory
/// backend; the cache never prevents startup.
pub fn build_identity_cache(settings: &CacheSettings) -> Option<CacheAsideStore<User>> {
    if !settings.enabled {
        tracing::info!("Identity cache disabled");
        return None;
    }

    let backend: Arc<dyn CacheBackend> = match settings.backend {
        CacheBackendKind::Memory => Arc::new(InMemoryCacheBackend::new()),
        CacheBackendKind::Lmdb => match LmdbCacheBackend::new(&settings.path, settings.max_size_mb) {
            Ok(backend) => Arc::new(backend),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %settings.path,
                    "Failed to open LMDB cache, using in-memory cache"
                );
                Arc::new(InMemoryCacheBackend::new())
            }
        },
    };

    tracing::info!(backend = ?settings.backend, ttl_secs = settings.ttl.as_secs(), "Identity cache enabled");
    Some(CacheAsideStore::new(backend, settings.cache_config()))
}

crate::impl_from_ref!(Authenticator, authenticator);
crate::impl_from_ref!(IdentityService, identity);
crate::impl_from_ref!(Arc<UserLifecycleCoordinator>, lifecycle);
crate::impl_from_ref!(OptimisticVersionStore, posts);
crate::impl_from_ref!(FeedService, feeds);
crate::impl_from_ref!(Arc<ApiConfig>, config);
