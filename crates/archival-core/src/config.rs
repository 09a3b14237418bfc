//! Process-wide configuration, read once at startup from the environment
//! (§6). There is no TOML/file-based configuration layer here — unlike the
//! control-plane config this crate started from, every knob this service
//! exposes is an environment variable, so a single `Config::from_env()`
//! call is enough to boot any of the three processes (machinist worker,
//! archivist worker, control/health server).

use crate::Error;
use std::time::Duration;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => default,
    }
}

/// Redis/list-store connection settings.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub tls: bool,
}

impl RedisSettings {
    fn from_env() -> Self {
        Self {
            url: env_opt_string("REDIS_URL"),
            host: env_string("REDIS_HOST", "127.0.0.1"),
            port: env_u16("REDIS_PORT", 6379),
            password: env_opt_string("REDIS_PASSWORD"),
            tls: env_bool("REDIS_TLS", false),
        }
    }

    /// Build a `redis://` connection string when `REDIS_URL` is absent.
    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        let scheme = if self.tls { "rediss" } else { "redis" };
        match &self.password {
            Some(password) => format!("{}://:{}@{}:{}", scheme, password, self.host, self.port),
            None => format!("{}://{}:{}", scheme, self.host, self.port),
        }
    }
}

/// Bearer tokens recognized by the control plane's auth middleware.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub admin: Option<String>,
    pub enqueue: Option<String>,
    pub worker_enqueue: Option<String>,
}

impl AuthTokens {
    fn from_env() -> Self {
        Self {
            admin: env_opt_string("ADMIN_API_TOKEN"),
            enqueue: env_opt_string("ENQUEUE_TOKEN"),
            worker_enqueue: env_opt_string("WORKER_ENQUEUE_TOKEN"),
        }
    }

    /// Whether `candidate` is accepted for an admin-only route.
    pub fn accepts_admin(&self, candidate: &str) -> bool {
        self.admin.as_deref() == Some(candidate)
    }

    /// Whether `candidate` is accepted for the enqueue route (either the
    /// operator enqueue token or the worker-to-worker token).
    pub fn accepts_enqueue(&self, candidate: &str) -> bool {
        self.enqueue.as_deref() == Some(candidate) || self.worker_enqueue.as_deref() == Some(candidate)
    }
}

/// Machinist resolution gates (§4.6 step 4).
#[derive(Debug, Clone, Copy)]
pub struct ResolutionGates {
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

/// Jobgroup poller cadence and retention.
#[derive(Debug, Clone)]
pub struct JobgroupSettings {
    pub poll_active_interval: Duration,
    pub poll_idle_interval: Duration,
    pub poll_lock_ttl: Duration,
    pub retention_days: u64,
    /// Directory of `<jobgroup_id>.jsonl` output files the poller reads
    /// directly instead of calling the batch API — an offline/test mode
    /// (§4.8 "Polling contract" step 2).
    pub mock_output_dir: Option<String>,
}

/// Model API collaborator settings for the archivist pipeline.
#[derive(Debug, Clone)]
pub struct ModelApiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

/// Blob store bucket labels, mirrored here for config-surface completeness;
/// `media::Buckets::from_env()` reads the same variables independently.
#[derive(Debug, Clone)]
pub struct BucketSettings {
    pub standard: String,
    pub archive: String,
    pub files: String,
}

/// Process-wide configuration, assembled once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis: RedisSettings,
    pub database_url: Option<String>,
    pub health_port: u16,
    pub auth: AuthTokens,
    pub jobgroup: JobgroupSettings,
    pub dlq_webhook_url: Option<String>,
    pub dry_run: bool,
    pub minimal_mode: bool,
    pub resolution_gates: ResolutionGates,
    pub b2_concurrency_limit: usize,
    pub model_api: ModelApiSettings,
    pub audit_dir: String,
    pub buckets: BucketSettings,
}

impl Config {
    /// Load configuration from the environment. Never fails in
    /// `MINIMAL_MODE` / `DRY_RUN`, which relax the otherwise-required
    /// `DATABASE_URL`.
    pub fn from_env() -> Result<Self, Error> {
        let dry_run = env_bool("DRY_RUN", false);
        let minimal_mode = env_bool("MINIMAL_MODE", false);
        let database_url = env_opt_string("DATABASE_URL");

        if database_url.is_none() && !dry_run && !minimal_mode {
            return Err(Error::config("DATABASE_URL is required unless DRY_RUN or MINIMAL_MODE is set"));
        }

        Ok(Self {
            redis: RedisSettings::from_env(),
            database_url,
            health_port: env_u16("HEALTH_PORT", 8081),
            auth: AuthTokens::from_env(),
            jobgroup: JobgroupSettings {
                poll_active_interval: Duration::from_millis(env_u64("JOBGROUP_POLL_ACTIVE_INTERVAL_MS", 300_000)),
                poll_idle_interval: Duration::from_millis(env_u64("JOBGROUP_POLL_IDLE_INTERVAL_MS", 300_000)),
                poll_lock_ttl: Duration::from_secs(env_u64("JOBGROUP_POLL_LOCK_TTL_SEC", 900)),
                retention_days: env_u64("JOBGROUP_RETENTION_DAYS", 30),
                mock_output_dir: env_opt_string("JOBGROUP_MOCK_OUTPUT_DIR"),
            },
            dlq_webhook_url: env_opt_string("DLQ_WEBHOOK_URL"),
            dry_run,
            minimal_mode,
            resolution_gates: ResolutionGates {
                min_width: env_u32("MACHINIST_MIN_WIDTH", 300),
                min_height: env_u32("MACHINIST_MIN_HEIGHT", 300),
                max_width: env_u32("MACHINIST_MAX_WIDTH", 12_000),
                max_height: env_u32("MACHINIST_MAX_HEIGHT", 12_000),
            },
            b2_concurrency_limit: env_usize("B2_CONCURRENCY_LIMIT", 5),
            model_api: ModelApiSettings {
                base_url: env_string("MODEL_API_BASE_URL", "https://api.openai.com/v1"),
                api_key: env_opt_string("MODEL_API_KEY"),
                model: env_string("MODEL_API_MODEL", "gpt-4o-mini"),
            },
            audit_dir: env_string("AUDIT_DIR", "./audit"),
            buckets: BucketSettings {
                standard: env_string("BLOB_BUCKET_STANDARD", "archival-standard"),
                archive: env_string("BLOB_BUCKET_ARCHIVE", "archival-archive"),
                files: env_string("BLOB_BUCKET_FILES", "archival-files"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_minimal_mode_skips_database_url_requirement() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("DATABASE_URL");
        std::env::set_var("MINIMAL_MODE", "true");
        let config = Config::from_env().unwrap();
        assert!(config.minimal_mode);
        std::env::remove_var("MINIMAL_MODE");
    }

    #[test]
    fn test_redis_connection_string_prefers_url() {
        let settings = RedisSettings {
            url: Some("redis://example:6379".to_string()),
            host: "ignored".to_string(),
            port: 1,
            password: None,
            tls: false,
        };
        assert_eq!(settings.connection_string(), "redis://example:6379");
    }

    #[test]
    fn test_auth_tokens_accept_either_enqueue_token() {
        let tokens = AuthTokens {
            admin: None,
            enqueue: Some("a".to_string()),
            worker_enqueue: Some("b".to_string()),
        };
        assert!(tokens.accepts_enqueue("a"));
        assert!(tokens.accepts_enqueue("b"));
        assert!(!tokens.accepts_enqueue("c"));
    }
}
