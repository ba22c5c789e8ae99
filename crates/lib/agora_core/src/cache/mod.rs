//! Key-value cache boundary.
//!
//! The auth core only needs `SET` with a TTL, `GET`, `EXISTS` and `DEL`.
//! Production uses [`RedisCache`]; tests and single-node development use
//! [`MemoryCache`].

pub mod memory;
pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryCache;
pub use self::redis_cache::RedisCache;

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Minimal async key-value store with per-key expiration.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Set `key` to `value`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Fetch `key`. A miss is `Ok(None)`.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Whether `key` is present and not expired.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;
}
