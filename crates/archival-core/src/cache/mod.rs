//! Redis caching and coordination layer.
//!
//! This module provides the Redis primitives shared across the crate:
//! connection pooling with reconnect/backoff, a namespaced key-prefix
//! helper, and a distributed lock used by the jobgroup poller to ensure
//! only one process runs the polling loop at a time.
//!
//! ## Performance characteristics
//!
//! - Connection pooling: reduces connection overhead
//! - Pipeline support: batch operations for efficiency
//! - Async operations: non-blocking Redis calls
//! - TTL support: automatic key expiration

pub mod config;
pub mod connection;
pub mod lock;

pub use config::RedisConfig;
pub use connection::{RedisConnection, RedisPool};
pub use lock::DistributedLock;

/// Cache result type alias
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("TTL expired for key: {0}")]
    Expired(String),

    #[error("Pool exhausted")]
    PoolExhausted,

    #[error("Timeout waiting for connection")]
    Timeout,
}

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    Failed,
    Exhausted,
}

/// Cache key prefix to avoid collisions between deployments sharing Redis
#[derive(Debug, Clone)]
pub struct KeyPrefix {
    prefix: String,
}

impl KeyPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, key: impl AsRef<str>) -> String {
        format!("{}:{}", self.prefix, key.as_ref())
    }
}

impl Default for KeyPrefix {
    fn default() -> Self {
        Self::new("archival")
    }
}

/// Namespaces for the keys this crate writes into Redis. Queue keys
/// themselves are bit-exact constants owned by `jobs::queue` — this
/// enum only covers auxiliary coordination state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    /// Distributed lock keys (e.g. jobgroup poller lock)
    Lock,

    /// Job/worker metrics counters
    Metrics,

    /// Scheduled/jobgroup sorted-set indices
    Index,
}

impl CacheNamespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheNamespace::Lock => "lock",
            CacheNamespace::Metrics => "metrics",
            CacheNamespace::Index => "index",
        }
    }

    pub fn key(&self, key: impl AsRef<str>) -> String {
        format!("{}:{}", self.prefix(), key.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefix() {
        let prefix = KeyPrefix::new("test");
        assert_eq!(prefix.key("user:123"), "test:user:123");
    }

    #[test]
    fn test_cache_namespace() {
        assert_eq!(CacheNamespace::Lock.key("jobgroup-poller"), "lock:jobgroup-poller");
        assert_eq!(CacheNamespace::Metrics.key("machinist"), "metrics:machinist");
    }
}
