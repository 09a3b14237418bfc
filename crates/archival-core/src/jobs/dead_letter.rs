//! Dead-letter lists for jobs that exhausted their retry budget.
//!
//! Entries live in Redis (`dlq:<worker>`), not in process memory, so they
//! survive a worker restart and are visible to the control plane. Only
//! identifiers and a short reason string are kept — never the original
//! queue payload in full, since Machinist/Archivist jobs may reference
//! tenant-owned assets the DLQ has no business retaining.

use crate::cache::RedisPool;
use crate::error::{Error, Result};
use crate::jobs::job::{Job, Worker};
use crate::webhook::WebhookNotifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

/// A single dead-lettered job, redacted to identifiers and a reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub tenant_id: Uuid,
    pub asset_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub job_type: String,
    pub attempts: u32,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DlqEntry {
    pub fn from_job(job: &Job, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            tenant_id: job.tenant_id(),
            asset_id: job.asset_id(),
            batch_id: job.batch_id(),
            job_type: job.job_type().to_string(),
            attempts,
            reason: reason.into(),
            dead_lettered_at: Utc::now(),
        }
    }

    /// Construct an entry with no backing `Job` value, for failures that
    /// only have identifiers to redact (e.g. one record inside a jobgroup
    /// output file).
    pub fn synthetic(tenant_id: Uuid, asset_id: Uuid, batch_id: Option<Uuid>, job_type: &str, reason: impl Into<String>) -> Self {
        Self {
            tenant_id,
            asset_id,
            batch_id,
            job_type: job_type.to_string(),
            attempts: 1,
            reason: reason.into(),
            dead_lettered_at: Utc::now(),
        }
    }
}

fn dlq_key(worker: Worker) -> String {
    format!("dlq:{}", worker.as_str())
}

#[derive(Clone)]
pub struct DeadLetterQueue {
    pool: RedisPool,
    webhook: WebhookNotifier,
}

impl DeadLetterQueue {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool, webhook: WebhookNotifier::disabled() }
    }

    /// Attach a webhook URL (§4.5 "optional webhook notification"), read
    /// from `Config::dlq_webhook_url` by callers. A no-op notifier when
    /// `url` is `None`.
    pub fn with_webhook(mut self, url: Option<String>) -> Self {
        self.webhook = WebhookNotifier::new(url);
        self
    }

    /// Append a redacted entry to the worker's dead-letter list. Best
    /// effort: logged and swallowed on failure, since a job that already
    /// failed its retries should not be lost because the DLQ write itself
    /// failed. Fires the optional webhook notification afterward,
    /// regardless of whether the Redis write itself succeeded.
    pub async fn send(&self, job: &Job, attempts: u32, reason: impl Into<String>) {
        let entry = DlqEntry::from_job(job, attempts, reason);
        let key = dlq_key(job.worker());

        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to serialize dead-letter entry: {}", e);
                return;
            }
        };

        match self.pool.get().await {
            Ok(mut conn) => {
                if let Err(e) = conn.rpush(&key, &bytes).await {
                    warn!("failed to write dead-letter entry to {}: {}", key, e);
                }
            }
            Err(e) => warn!("failed to reach redis to write dead-letter entry: {}", e),
        }

        self.webhook.notify("dlq.entry", json!(entry)).await;
    }

    /// Append a synthetic entry for a failure that has no `Job` payload to
    /// redact from — e.g. a single record inside a jobgroup output file
    /// (§4.8 "Result processing" step 4: "route a synthetic DLQ entry of
    /// kind `archivist.jobgroup-result`"). Best effort, like `send`.
    pub async fn send_synthetic(
        &self,
        worker: Worker,
        tenant_id: Uuid,
        asset_id: Uuid,
        batch_id: Option<Uuid>,
        job_type: &str,
        reason: impl Into<String>,
    ) {
        let entry = DlqEntry::synthetic(tenant_id, asset_id, batch_id, job_type, reason);
        let key = dlq_key(worker);

        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to serialize synthetic dead-letter entry: {}", e);
                return;
            }
        };

        match self.pool.get().await {
            Ok(mut conn) => {
                if let Err(e) = conn.rpush(&key, &bytes).await {
                    warn!("failed to write synthetic dead-letter entry to {}: {}", key, e);
                }
            }
            Err(e) => warn!("failed to reach redis to write synthetic dead-letter entry: {}", e),
        }

        self.webhook.notify("dlq.entry", json!(entry)).await;
    }

    /// Peek at up to `limit` most recent entries for a worker, for the
    /// control plane's diagnostic surface. Does not remove them.
    pub async fn recent(&self, worker: Worker, limit: i64) -> Result<Vec<DlqEntry>> {
        let key = dlq_key(worker);
        let mut conn = self.pool.get().await.map_err(Error::from)?;
        let raw = conn.lrange(&key, -limit, -1).await.map_err(Error::from)?;

        let mut out = Vec::with_capacity(raw.len());
        for bytes in raw {
            match serde_json::from_slice::<DlqEntry>(&bytes) {
                Ok(entry) => out.push(entry),
                Err(e) => warn!("skipping unparseable dead-letter entry: {}", e),
            }
        }
        Ok(out)
    }

    pub async fn depth(&self, worker: Worker) -> Result<i64> {
        let key = dlq_key(worker);
        let mut conn = self.pool.get().await.map_err(Error::from)?;
        conn.llen(&key).await.map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{ArchivistJob, Priority};

    #[test]
    fn test_dlq_entry_redacts_to_identifiers_only() {
        let job = Job::Archivist(ArchivistJob {
            tenant_id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            batch_id: Some(Uuid::new_v4()),
            processing_type: Priority::Standard,
        });
        let entry = DlqEntry::from_job(&job, 3, "model timeout");
        assert_eq!(entry.attempts, 3);
        assert_eq!(entry.job_type, "archivist");
        assert_eq!(entry.reason, "model timeout");
    }

    #[test]
    fn test_dlq_key_namespaced_per_worker() {
        assert_eq!(dlq_key(Worker::Machinist), "dlq:machinist");
        assert_eq!(dlq_key(Worker::Archivist), "dlq:archivist");
    }

    #[test]
    fn test_synthetic_entry_has_no_job_payload() {
        let asset_id = Uuid::new_v4();
        let entry = DlqEntry::synthetic(Uuid::new_v4(), asset_id, None, "archivist.jobgroup-result", "model output rejected");
        assert_eq!(entry.asset_id, asset_id);
        assert_eq!(entry.job_type, "archivist.jobgroup-result");
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.reason, "model output rejected");
    }
}
