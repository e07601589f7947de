//! Credential cache capability.
//!
//! Holds failed-login counters, account locks and the access binding. Every
//! entry expires on its own TTL; nothing here is durable.

mod memory;
mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache value is not an integer: {0}")]
    NotAnInteger(String),
}

impl From<::redis::RedisError> for CacheError {
    fn from(e: ::redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

/// Key/value store with per-key expiry.
#[async_trait]
pub trait CredentialCache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Atomically increment the counter at `key` and reset its TTL.
    /// Returns the post-increment value. A missing key counts from zero.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

/// Cache key for `identifier` under a configured prefix: `"{prefix}-{identifier}"`.
pub fn cache_key(prefix: &str, identifier: impl std::fmt::Display) -> String {
    format!("{}-{}", prefix, identifier)
}

/// Whole seconds for a TTL, never below one.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
