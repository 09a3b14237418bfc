//! Job processing limits and thresholds, read from environment variables
//! at process start the way `cache::config::RedisConfig` does.

use std::env;
use std::time::Duration;

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Timeouts, resolution gates, and concurrency widths governing both
/// workers' execution envelopes.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// How long a single `BRPOP` across a worker's three lanes blocks
    /// before returning empty and looping again (to recheck the shutdown
    /// token).
    pub queue_poll_timeout_secs: u64,

    /// EXIF extraction budget.
    pub exif_timeout: Duration,

    /// Per-derivative image codec call budget.
    pub sharp_timeout: Duration,

    /// Advisory whole-job budget, enforced loosely by the outer retry
    /// window rather than a hard cancellation.
    pub max_job_duration: Duration,

    /// Accepted image resolution range.
    pub machinist_min_width: u32,
    pub machinist_min_height: u32,
    pub machinist_max_width: u32,
    pub machinist_max_height: u32,

    /// Global blob-store concurrency pool width.
    pub b2_concurrency_limit: usize,

    /// Jobgroup poller cadence.
    pub jobgroup_poll_active_interval: Duration,
    pub jobgroup_poll_idle_interval: Duration,
    pub jobgroup_poll_lock_ttl_secs: u64,
    pub jobgroup_retention_days: u64,

    /// Directory of `<jobgroup_id>.jsonl` output files the poller reads
    /// directly instead of calling the batch API (§4.8 step 2).
    pub jobgroup_mock_output_dir: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            queue_poll_timeout_secs: 5,
            exif_timeout: Duration::from_secs(10),
            sharp_timeout: Duration::from_secs(30),
            max_job_duration: Duration::from_secs(5 * 60),
            machinist_min_width: 300,
            machinist_min_height: 300,
            machinist_max_width: 12_000,
            machinist_max_height: 12_000,
            b2_concurrency_limit: 5,
            jobgroup_poll_active_interval: Duration::from_millis(300_000),
            jobgroup_poll_idle_interval: Duration::from_millis(300_000),
            jobgroup_poll_lock_ttl_secs: 900,
            jobgroup_retention_days: 30,
            jobgroup_mock_output_dir: None,
        }
    }
}

impl JobConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            queue_poll_timeout_secs: env_u64("QUEUE_POLL_TIMEOUT_SEC", default.queue_poll_timeout_secs),
            exif_timeout: Duration::from_millis(env_u64("EXIF_TIMEOUT_MS", default.exif_timeout.as_millis() as u64)),
            sharp_timeout: Duration::from_millis(env_u64("SHARP_TIMEOUT_MS", default.sharp_timeout.as_millis() as u64)),
            max_job_duration: Duration::from_millis(env_u64(
                "MAX_JOB_DURATION_MS",
                default.max_job_duration.as_millis() as u64,
            )),
            machinist_min_width: env_u32("MACHINIST_MIN_WIDTH", default.machinist_min_width),
            machinist_min_height: env_u32("MACHINIST_MIN_HEIGHT", default.machinist_min_height),
            machinist_max_width: env_u32("MACHINIST_MAX_WIDTH", default.machinist_max_width),
            machinist_max_height: env_u32("MACHINIST_MAX_HEIGHT", default.machinist_max_height),
            b2_concurrency_limit: env_usize("B2_CONCURRENCY_LIMIT", default.b2_concurrency_limit),
            jobgroup_poll_active_interval: Duration::from_millis(env_u64(
                "JOBGROUP_POLL_ACTIVE_INTERVAL_MS",
                default.jobgroup_poll_active_interval.as_millis() as u64,
            )),
            jobgroup_poll_idle_interval: Duration::from_millis(env_u64(
                "JOBGROUP_POLL_IDLE_INTERVAL_MS",
                default.jobgroup_poll_idle_interval.as_millis() as u64,
            )),
            jobgroup_poll_lock_ttl_secs: env_u64("JOBGROUP_POLL_LOCK_TTL_SEC", default.jobgroup_poll_lock_ttl_secs),
            jobgroup_retention_days: env_u64("JOBGROUP_RETENTION_DAYS", default.jobgroup_retention_days),
            jobgroup_mock_output_dir: env::var("JOBGROUP_MOCK_OUTPUT_DIR").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_spec() {
        let config = JobConfig::default();
        assert_eq!(config.machinist_min_width, 300);
        assert_eq!(config.machinist_max_width, 12_000);
        assert_eq!(config.exif_timeout, Duration::from_secs(10));
        assert_eq!(config.sharp_timeout, Duration::from_secs(30));
        assert_eq!(config.jobgroup_poll_lock_ttl_secs, 900);
    }
}
