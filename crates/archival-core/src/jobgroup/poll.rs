//! The jobgroup polling loop (§4.8 "Polling contract"): a long-running
//! task with an adaptive interval that checks every non-terminal jobgroup
//! against the remote batch endpoint and hands completed ones to the
//! result processor.

use crate::cache::connection::RedisPool;
use crate::cache::lock::{AcquireOutcome, DistributedLock};
use crate::db::jobgroup::{JobgroupRepository, JobgroupStatus};
use crate::jobgroup::batch_client::BatchApiClient;
use crate::jobgroup::process::JobgroupResultProcessor;
use crate::jobgroup::audit::JobgroupAuditLog;
use crate::webhook::WebhookNotifier;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const LOCK_KEY: &str = "jobgroup_poller_lock";

pub struct JobgroupPoller {
    redis: RedisPool,
    jobgroups: JobgroupRepository,
    client: BatchApiClient,
    processor: JobgroupResultProcessor,
    audit: JobgroupAuditLog,
    webhook: WebhookNotifier,
    lock_ttl_secs: u64,
    active_interval: Duration,
    idle_interval: Duration,
    /// When set, the poller reads `<mock_output_dir>/<jobgroup_id>.jsonl`
    /// instead of contacting the batch API — a test/offline mode named
    /// explicitly in §4.8's polling contract.
    mock_output_dir: Option<PathBuf>,
}

impl JobgroupPoller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        redis: RedisPool,
        jobgroups: JobgroupRepository,
        client: BatchApiClient,
        processor: JobgroupResultProcessor,
        audit: JobgroupAuditLog,
        lock_ttl_secs: u64,
        active_interval: Duration,
        idle_interval: Duration,
        webhook: WebhookNotifier,
    ) -> Self {
        Self {
            redis,
            jobgroups,
            client,
            processor,
            audit,
            webhook,
            lock_ttl_secs,
            active_interval,
            idle_interval,
            mock_output_dir: None,
        }
    }

    pub fn with_mock_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.mock_output_dir = dir;
        self
    }

    /// Run the loop until cancelled, sleeping `idle_interval` after an empty
    /// cycle or `active_interval` after one that found work.
    pub async fn run(&self, cancellation: CancellationToken) {
        loop {
            if cancellation.is_cancelled() {
                info!("jobgroup poller shutting down");
                return;
            }

            let found_work = match self.run_once().await {
                Ok(found_work) => found_work,
                Err(e) => {
                    error!(error = %e, "jobgroup poll cycle failed");
                    false
                }
            };

            let sleep_for = if found_work { self.active_interval } else { self.idle_interval };
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = cancellation.cancelled() => {
                    info!("jobgroup poller shutting down during sleep");
                    return;
                }
            }
        }
    }

    /// Run a single poll cycle. Returns whether any jobgroup was found
    /// pollable (used to pick the adaptive sleep interval).
    pub async fn run_once(&self) -> crate::Result<bool> {
        let (lock, outcome) = DistributedLock::try_acquire(self.redis.clone(), LOCK_KEY, self.lock_ttl_secs).await;
        if outcome == AcquireOutcome::HeldElsewhere {
            return Ok(false);
        }

        let pollable = self.jobgroups.list_pollable().await?;
        let found_work = !pollable.is_empty();

        for jobgroup in pollable {
            if let Some(mock_dir) = &self.mock_output_dir {
                let mock_path = mock_dir.join(format!("{}.jsonl", jobgroup.id));
                if mock_path.exists() {
                    match tokio::fs::read(&mock_path).await {
                        Ok(bytes) => {
                            if jobgroup.output_file_id.is_none() {
                                let _ = self
                                    .jobgroups
                                    .set_output_file(jobgroup.id, &format!("mock:{}", jobgroup.id))
                                    .await;
                            }
                            if let Err(e) = self.processor.process_completed_bytes(jobgroup.id, &bytes, &lock).await {
                                warn!(jobgroup_id = %jobgroup.id, error = %e, "mock jobgroup result processing failed");
                            }
                        }
                        Err(e) => warn!(jobgroup_id = %jobgroup.id, error = %e, "failed to read mock output file"),
                    }
                    lock.refresh().await;
                    continue;
                }
            }

            let remote = match self.client.get_batch(&jobgroup.external_jobgroup_id).await {
                Ok(remote) => remote,
                Err(e) => {
                    warn!(jobgroup_id = %jobgroup.id, error = %e, "failed to fetch remote jobgroup status");
                    continue;
                }
            };

            match remote.status.as_str() {
                "completed" => {
                    if let Some(output_file_id) = &remote.output_file_id {
                        if let Err(e) = self.jobgroups.set_output_file(jobgroup.id, output_file_id).await {
                            warn!(jobgroup_id = %jobgroup.id, error = %e, "failed to persist output_file_id");
                            continue;
                        }
                        if let Err(e) = self.processor.process_completed(jobgroup.id, output_file_id, &lock).await {
                            warn!(jobgroup_id = %jobgroup.id, error = %e, "jobgroup result processing failed");
                        }
                    } else {
                        warn!(jobgroup_id = %jobgroup.id, "remote reports completed but no output_file_id yet");
                    }
                }
                "failed" | "expired" => {
                    let status = if remote.status == "expired" { JobgroupStatus::Expired } else { JobgroupStatus::Failed };
                    let _ = self.jobgroups.transition(jobgroup.id, status, Some(json!({"remote_status": remote.status}))).await;
                    self.audit.record(jobgroup.id, status.as_str(), json!({"remote_status": remote.status}));
                    self.webhook
                        .notify("jobgroup.failed", json!({"jobgroup_id": jobgroup.id, "remote_status": remote.status}))
                        .await;
                }
                _ => {
                    let _ = self.jobgroups.transition(jobgroup.id, JobgroupStatus::InProgress, None).await;
                }
            }

            lock.refresh().await;
        }

        lock.release().await;
        Ok(found_work)
    }
}
