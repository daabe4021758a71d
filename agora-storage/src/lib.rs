//! Agora Storage - Store Traits, Mock Storage and Identity Cache
//!
//! Defines the async storage seams used by the API layer. The PostgreSQL
//! implementation lives in agora-api; this crate ships the in-memory
//! [`MockStorage`] and the cache-aside read path for identities.

pub mod cache;
pub mod deadline;
pub mod mock;
pub mod store;

pub use cache::{
    CacheAsideStats, CacheAsideStore, CacheBackend, CacheConfig, CacheError, CacheStats,
    CacheableEntity, CachedBytes, InMemoryCacheBackend, LmdbCacheBackend, LmdbCacheError,
};
pub use deadline::{with_deadline, DEFAULT_STORE_TIMEOUT};
pub use mock::MockStorage;
pub use store::{PostStore, UserStore};
