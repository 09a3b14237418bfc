//! The five namespaced Redis list queues (`jobs:machinist:{instant,standard}`,
//! `jobs:archivist:{instant,standard,jobgroup}`) plus their two dead-letter
//! lists.
//!
//! Enqueue is a plain `RPUSH`. Dequeue has two shapes: a strict-priority
//! blocking pop (`BRPOP`) used by Machinist, and a strict-priority
//! non-blocking scan with an idle sleep used by Archivist so its process
//! can interleave the jobgroup poller without holding a connection open in
//! a long block. Both try lanes in the same priority order.

use crate::cache::RedisPool;
use crate::error::{Error, Result};
use crate::jobs::job::{Job, Worker};
use crate::jobs::router::{lanes_for_worker, resolve_queue, QueueLane};
use tracing::{debug, warn};

/// Legacy shared-priority keys a prior deployment generation wrote jobs
/// into before workers were split into namespaced lanes. Entries are
/// classified by `job_type` as they are drained, so a single legacy key
/// can hold a mix of Machinist and Archivist jobs.
pub const LEGACY_INSTANT_QUEUE_KEY: &str = "jobs:instant";
pub const LEGACY_STANDARD_QUEUE_KEY: &str = "jobs:standard";
pub const LEGACY_JOBGROUP_QUEUE_KEY: &str = "jobs:jobgroup";

pub const LEGACY_QUEUE_KEYS: &[&str] = &[
    LEGACY_INSTANT_QUEUE_KEY,
    LEGACY_STANDARD_QUEUE_KEY,
    LEGACY_JOBGROUP_QUEUE_KEY,
];

#[derive(Clone)]
pub struct JobQueue {
    pool: RedisPool,
}

impl JobQueue {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Push a validated job onto its resolved lane.
    pub async fn enqueue(&self, job: &Job) -> Result<()> {
        let lane = resolve_queue(job);
        let bytes = encode(job)?;

        let mut conn = self.pool.get().await.map_err(Error::from)?;
        conn.rpush(&lane.key(), &bytes).await.map_err(Error::from)?;
        debug!("enqueued {} job onto {}", job.worker(), lane.key());
        Ok(())
    }

    /// Block up to `timeout_secs` waiting for a job on any of `worker`'s
    /// lanes, trying them in strict priority order every call. Used by
    /// Machinist.
    pub async fn blocking_dequeue(&self, worker: Worker, timeout_secs: u64) -> Result<Option<Job>> {
        let lanes = lanes_for_worker(worker);
        let keys: Vec<String> = lanes.iter().map(QueueLane::key).collect();

        let mut conn = self.pool.get().await.map_err(Error::from)?;
        let popped = conn.blpop(&keys, timeout_secs).await.map_err(Error::from)?;

        match popped {
            None => Ok(None),
            Some((key, bytes)) => Ok(decode_or_dead_letter(&mut conn, worker, &key, &bytes).await),
        }
    }

    /// Non-blocking scan of `worker`'s lanes in strict priority order,
    /// returning the first job found. Used by Archivist so the same
    /// process loop can interleave the jobgroup poller; callers sleep
    /// themselves when this returns `None`.
    pub async fn try_dequeue(&self, worker: Worker) -> Result<Option<Job>> {
        let lanes = lanes_for_worker(worker);
        let mut conn = self.pool.get().await.map_err(Error::from)?;

        for lane in lanes {
            if let Some(bytes) = conn.rpop(&lane.key()).await.map_err(Error::from)? {
                if let Some(job) = decode_or_dead_letter(&mut conn, worker, &lane.key(), &bytes).await {
                    return Ok(Some(job));
                }
                continue;
            }
        }
        Ok(None)
    }

    /// Depth of a single lane, for the `/queues` diagnostic endpoint.
    pub async fn lane_depth(&self, lane: QueueLane) -> Result<i64> {
        let mut conn = self.pool.get().await.map_err(Error::from)?;
        conn.llen(&lane.key()).await.map_err(Error::from)
    }

    /// Depths for all lanes of a worker, in priority order.
    pub async fn worker_depths(&self, worker: Worker) -> Result<Vec<(QueueLane, i64)>> {
        let mut out = Vec::new();
        for lane in lanes_for_worker(worker) {
            let depth = self.lane_depth(lane).await?;
            out.push((lane, depth));
        }
        Ok(out)
    }

    /// Re-push a job at the front of its lane (used when a worker is
    /// shutting down mid-job and wants to return an in-flight job rather
    /// than lose it). Logged at warn level per the requeue contract.
    pub async fn requeue_front(&self, job: &Job) -> Result<()> {
        let lane = resolve_queue(job);
        let bytes = encode(job)?;

        let mut conn = self.pool.get().await.map_err(Error::from)?;
        conn.lpush(&lane.key(), &bytes).await.map_err(Error::from)?;
        warn!("requeued {} job onto {}", job.worker(), lane.key());
        Ok(())
    }

    /// Drain a legacy shared-priority key, parsing and re-enqueuing each
    /// element onto the namespaced lane its `job_type` resolves to.
    /// Intended to run once at startup during the migration window; safe
    /// to call repeatedly since it empties the legacy key as it goes.
    pub async fn migrate_legacy_queue(&self, legacy_key: &str) -> Result<usize> {
        let mut conn = self.pool.get().await.map_err(Error::from)?;
        let mut migrated = 0usize;

        loop {
            let popped = conn.rpop(legacy_key).await.map_err(Error::from)?;
            let bytes = match popped {
                Some(bytes) => bytes,
                None => break,
            };

            let job = match decode_legacy_or_dead_letter(&mut conn, legacy_key, &bytes).await {
                Some(job) => job,
                None => continue,
            };

            let lane = resolve_queue(&job);
            conn.rpush(&lane.key(), &bytes).await.map_err(Error::from)?;
            migrated += 1;
        }

        if migrated > 0 {
            debug!("migrated {} legacy jobs out of {}", migrated, legacy_key);
        }
        Ok(migrated)
    }
}

fn encode(job: &Job) -> Result<Vec<u8>> {
    let value = job.to_json().map_err(Error::Serialization)?;
    serde_json::to_vec(&value).map_err(Error::Serialization)
}

fn dlq_key(worker: Worker) -> String {
    format!("dlq:{}", worker.as_str())
}

/// Parse a raw queue element into a job. Kept free of I/O so the parsing
/// logic itself stays unit-testable without a live Redis connection.
fn try_decode(bytes: &[u8]) -> std::result::Result<Job, String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    Job::from_json(&value).map_err(|e| e.to_string())
}

/// Recover the worker a raw legacy element would belong to, from its own
/// `job_type` field, without requiring the rest of the payload to be
/// well-formed.
fn job_type_worker(bytes: &[u8]) -> Option<Worker> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    value.get("job_type").and_then(serde_json::Value::as_str).and_then(Worker::from_job_type)
}

/// Best-effort raw push onto `dlq:<worker>` for an element that could not
/// be decoded into a job. Per §4.1/§4.4, a parse failure never raises to
/// the caller; it redirects the untouched raw element to the dead-letter
/// list instead, and the attempt returns nothing.
async fn dead_letter_raw(conn: &mut crate::cache::connection::RedisConnection, worker: Worker, source_key: &str, bytes: &[u8]) {
    let key = dlq_key(worker);
    if let Err(e) = conn.rpush(&key, bytes).await {
        warn!("failed to dead-letter unparseable payload from {} onto {}: {}", source_key, key, e);
    }
}

/// Decode a raw element popped from a known worker's lane. On failure, the
/// raw bytes are redirected to `dlq:<worker>` before returning `None`.
async fn decode_or_dead_letter(
    conn: &mut crate::cache::connection::RedisConnection,
    worker: Worker,
    source_key: &str,
    bytes: &[u8],
) -> Option<Job> {
    match try_decode(bytes) {
        Ok(job) => Some(job),
        Err(e) => {
            warn!("dead-lettering unparseable payload popped from {}: {}", source_key, e);
            dead_letter_raw(conn, worker, source_key, bytes).await;
            None
        }
    }
}

/// Same as `decode_or_dead_letter`, but for the legacy migration utility,
/// which has no single worker for its source key (a legacy key may hold a
/// mix of Machinist and Archivist jobs). The worker is recovered from the
/// payload's own `job_type` field when the payload parses as JSON at all;
/// an element that is not even valid JSON carries no attributable worker
/// and is dropped with a warning, since there is no `dlq:<worker>` to
/// redirect it to.
async fn decode_legacy_or_dead_letter(conn: &mut crate::cache::connection::RedisConnection, source_key: &str, bytes: &[u8]) -> Option<Job> {
    match try_decode(bytes) {
        Ok(job) => Some(job),
        Err(e) => {
            match job_type_worker(bytes) {
                Some(worker) => {
                    warn!("dead-lettering malformed legacy payload from {}: {}", source_key, e);
                    dead_letter_raw(conn, worker, source_key, bytes).await;
                }
                None => warn!("dropping malformed legacy payload from {} (no attributable worker): {}", source_key, e),
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{ArchivistJob, Priority};
    use uuid::Uuid;

    #[test]
    fn test_lane_keys_are_distinct_per_worker_and_priority() {
        let machinist_instant = QueueLane { worker: Worker::Machinist, priority: Priority::Instant };
        let archivist_instant = QueueLane { worker: Worker::Archivist, priority: Priority::Instant };
        assert_ne!(machinist_instant.key(), archivist_instant.key());
    }

    #[test]
    fn test_job_serializes_for_queue_payload() {
        let job = Job::Archivist(ArchivistJob {
            tenant_id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            batch_id: None,
            processing_type: Priority::Standard,
        });
        let bytes = encode(&job).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let parsed = Job::from_json(&value).unwrap();
        assert_eq!(parsed.asset_id(), job.asset_id());
    }

    #[test]
    fn test_try_decode_rejects_malformed_payload() {
        assert!(try_decode(b"not json").is_err());
    }

    #[test]
    fn test_job_type_worker_recovered_from_partially_malformed_payload() {
        let bytes = br#"{"job_type": "archivist", "tenant_id": "not-a-uuid"}"#;
        assert_eq!(job_type_worker(bytes), Some(Worker::Archivist));
    }

    #[test]
    fn test_job_type_worker_none_when_unparseable() {
        assert_eq!(job_type_worker(b"not json"), None);
    }
}
