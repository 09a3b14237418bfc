//! Redis connection configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis server URL (redis://host:port/db)
    pub url: String,

    /// Use TLS/SSL for connection
    #[serde(default = "default_false")]
    pub use_tls: bool,

    /// Verify TLS certificate
    #[serde(default = "default_true")]
    pub verify_certificate: bool,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Connection timeout
    #[serde(default = "default_timeout")]
    pub connect_timeout_ms: u64,

    /// Read timeout
    #[serde(default = "default_timeout")]
    pub read_timeout_ms: u64,

    /// Write timeout
    #[serde(default = "default_timeout")]
    pub write_timeout_ms: u64,

    /// Retry failed connections
    #[serde(default = "default_true")]
    pub retry_on_failure: bool,

    /// Max retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Retry delay in ms
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Key prefix to avoid collisions between deployments sharing a Redis instance
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Default TTL for keys that carry one (seconds)
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: u64,

    /// Authentication password
    #[serde(default)]
    pub password: Option<String>,

    /// Database number (0-15)
    #[serde(default)]
    pub database: u8,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            use_tls: false,
            verify_certificate: true,
            pool_size: 20,
            connect_timeout_ms: 5000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            retry_on_failure: true,
            max_retries: 3,
            retry_delay_ms: 1000,
            key_prefix: "archival".to_string(),
            default_ttl_secs: 3600,
            password: None,
            database: 0,
        }
    }
}

impl RedisConfig {
    /// Build from the environment variables documented for this service:
    /// `REDIS_URL` (preferred), or `REDIS_HOST`/`REDIS_PORT`/`REDIS_PASSWORD`/`REDIS_TLS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("REDIS_URL") {
            config.url = url;
        } else {
            let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
            let port = std::env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
            config.url = format!("redis://{}:{}/0", host, port);
        }

        if let Ok(password) = std::env::var("REDIS_PASSWORD") {
            if !password.is_empty() {
                config.password = Some(password);
            }
        }

        if let Ok(tls) = std::env::var("REDIS_TLS") {
            config.use_tls = matches!(tls.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        config
    }

    /// Development configuration (local Redis)
    pub fn development() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            pool_size: 5,
            connect_timeout_ms: 2000,
            ..Self::default()
        }
    }

    /// Production configuration
    pub fn production() -> Self {
        Self {
            use_tls: true,
            verify_certificate: true,
            pool_size: 50,
            connect_timeout_ms: 3000,
            retry_on_failure: true,
            max_retries: 5,
            retry_delay_ms: 500,
            default_ttl_secs: 7200,
            key_prefix: "archival:prod".to_string(),
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_pool_size() -> usize {
    20
}
fn default_timeout() -> u64 {
    5000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_key_prefix() -> String {
    "archival".to_string()
}
fn default_ttl() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_default() {
        let config = RedisConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1:6379/0");
        assert_eq!(config.pool_size, 20);
        assert_eq!(config.connect_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_redis_config_development() {
        let config = RedisConfig::development();
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.connect_timeout(), Duration::from_millis(2000));
    }

    #[test]
    fn test_redis_config_production() {
        let config = RedisConfig::production();
        assert!(config.use_tls);
        assert_eq!(config.pool_size, 50);
        assert!(config.verify_certificate);
    }

    #[test]
    fn test_redis_config_from_env_defaults_without_vars() {
        std::env::remove_var("REDIS_URL");
        std::env::remove_var("REDIS_HOST");
        std::env::remove_var("REDIS_PORT");
        std::env::remove_var("REDIS_PASSWORD");
        std::env::remove_var("REDIS_TLS");
        let config = RedisConfig::from_env();
        assert_eq!(config.url, "redis://127.0.0.1:6379/0");
        assert!(!config.use_tls);
    }
}
