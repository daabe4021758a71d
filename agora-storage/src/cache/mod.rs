//! Identity cache.
//!
//! [`CacheAsideStore`] sits in front of a pluggable [`CacheBackend`]
//! (LMDB on disk, or in-process). The relational store stays the source of
//! truth; the cache only ever holds a copy that is at most one TTL old and is
//! dropped on every write to the underlying entity.

pub mod cache_aside;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use cache_aside::{CacheAsideStats, CacheAsideStore, CacheConfig};
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory::InMemoryCacheBackend;
pub use traits::{CacheBackend, CacheError, CacheStats, CacheableEntity, CachedBytes};
