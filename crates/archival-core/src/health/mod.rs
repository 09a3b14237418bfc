//! Computed health snapshot for `GET /health` (§4.10).
//!
//! Unlike the metrics registry, nothing here is accumulated in the
//! background — every field is recomputed from live checks at request
//! time, so the snapshot always reflects current reachability rather than
//! a cached belief about it.

use crate::cache::RedisPool;
use crate::db::Database;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueDepths {
    pub machinist_instant: i64,
    pub machinist_standard: i64,
    pub archivist_instant: i64,
    pub archivist_standard: i64,
    pub archivist_jobgroup: i64,
    pub dlq_machinist: i64,
    pub dlq_archivist: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub redis_ok: bool,
    pub database_ok: bool,
    pub jobgroup_poller_last_cycle: Option<DateTime<Utc>>,
    pub jobgroup_poller_stale: bool,
    pub queue_depths: Option<QueueDepths>,
}

/// How long the jobgroup poller can go without a successful cycle before
/// its staleness degrades the overall snapshot.
const POLLER_STALE_AFTER_SECS: i64 = 1800;

impl HealthSnapshot {
    /// Compute a fresh snapshot. `jobgroup_poller_last_cycle` is read from
    /// the archivist worker process's shared state (`None` from the
    /// control-plane process, which does not run the poller itself, or
    /// before the poller has completed its first cycle).
    pub async fn compute(
        redis: &RedisPool,
        database: Option<&Database>,
        queue_depths: Option<QueueDepths>,
        jobgroup_poller_last_cycle: Option<DateTime<Utc>>,
    ) -> Self {
        let redis_ok = redis.health_check().await.unwrap_or(false);
        let database_ok = match database {
            Some(db) => db.health_check().await,
            None => true,
        };

        let poller_stale = match jobgroup_poller_last_cycle {
            Some(last) => (Utc::now() - last).num_seconds() > POLLER_STALE_AFTER_SECS,
            None => false,
        };

        let status = if !redis_ok || !database_ok {
            HealthStatus::Unhealthy
        } else if poller_stale {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            redis_ok,
            database_ok,
            jobgroup_poller_last_cycle,
            jobgroup_poller_stale: poller_stale,
            queue_depths,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poller_staleness_threshold() {
        let fresh = Utc::now();
        assert!((Utc::now() - fresh).num_seconds() <= POLLER_STALE_AFTER_SECS);

        let stale = Utc::now() - chrono::Duration::seconds(POLLER_STALE_AFTER_SECS + 60);
        assert!((Utc::now() - stale).num_seconds() > POLLER_STALE_AFTER_SECS);
    }
}
