//! The single-loop-per-process worker: one `WorkerLoop` drives either the
//! Machinist or the Archivist queue set, wrapping every handler
//! invocation in the resilience envelope (metrics, retry, dead-lettering,
//! batch status).
//!
//! There is deliberately no per-job `tokio::spawn` and no worker pool —
//! each process runs exactly one loop, and horizontal scale comes from
//! running more processes, each pulling from the same namespaced queues.

use crate::jobs::batch_status::{BatchStatus, BatchStatusTracker};
use crate::jobs::config::JobConfig;
use crate::jobs::dead_letter::DeadLetterQueue;
use crate::jobs::job::{Job, Worker};
use crate::jobs::metrics::JobMetrics;
use crate::jobs::queue::JobQueue;
use crate::jobs::retry::RetryPolicy;
use crate::Error;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Implemented by the Machinist and Archivist pipelines. A single method:
/// everything about a job's outcome is communicated through `Result`.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), Error>;
}

fn metrics_key(job: &Job) -> String {
    format!("{}:{}", job.worker(), job.priority())
}

/// Drives one worker's queue set to completion, applying the resilience
/// envelope around every dequeued job.
pub struct WorkerLoop {
    worker: Worker,
    queue: JobQueue,
    dlq: DeadLetterQueue,
    metrics: JobMetrics,
    batch_status: BatchStatusTracker,
    retry_policy: RetryPolicy,
    config: JobConfig,
    handler: Arc<dyn JobHandler>,
    shutdown: CancellationToken,
}

impl WorkerLoop {
    pub fn new(
        worker: Worker,
        queue: JobQueue,
        dlq: DeadLetterQueue,
        metrics: JobMetrics,
        batch_status: BatchStatusTracker,
        config: JobConfig,
        handler: Arc<dyn JobHandler>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            worker,
            queue,
            dlq,
            metrics,
            batch_status,
            retry_policy: RetryPolicy::default(),
            config,
            handler,
            shutdown,
        }
    }

    /// Run until the shutdown token fires. In-flight jobs always run to
    /// their retry/DLQ terminal before the loop returns.
    pub async fn run(&self) {
        info!("{} worker loop starting", self.worker);

        match self.worker {
            Worker::Machinist => self.run_blocking().await,
            Worker::Archivist => self.run_scanning().await,
        }

        info!("{} worker loop stopped", self.worker);
    }

    /// Machinist: blocking pop over `[instant, standard]` with a
    /// 30-second (configurable) block, cancellable mid-wait.
    async fn run_blocking(&self) {
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }

            let dequeue = self.queue.blocking_dequeue(self.worker, self.config.queue_poll_timeout_secs);
            let popped = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                result = dequeue => result,
            };

            match popped {
                Ok(Some(job)) => self.execute(job).await,
                Ok(None) => continue,
                Err(e) => {
                    error!("{} queue unreachable: {}", self.worker, e);
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
            }
        }
    }

    /// Archivist: non-blocking priority scan over `[instant, standard,
    /// jobgroup]` with a 1-second idle sleep, so the same process can
    /// interleave the jobgroup poller without a long-held connection.
    async fn run_scanning(&self) {
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }

            match self.queue.try_dequeue(self.worker).await {
                Ok(Some(job)) => self.execute(job).await,
                Ok(None) => {
                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => return,
                        _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
                    }
                }
                Err(e) => {
                    error!("{} queue unreachable: {}", self.worker, e);
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
            }
        }
    }

    /// The resilience envelope: start/end metrics, bounded retry, dead
    /// lettering on exhaustion, and batch status propagation on success.
    async fn execute(&self, job: Job) {
        let key = metrics_key(&job);
        self.metrics.record_started(&key);
        let started = Instant::now();

        info!(
            tenant_id = %job.tenant_id(),
            asset_id = %job.asset_id(),
            worker = %job.worker(),
            "job started"
        );

        let mut attempt = 0u32;
        let outcome = loop {
            match self.handler.handle(&job).await {
                Ok(()) => break Ok(()),
                Err(error) => {
                    if !error.is_retryable() {
                        break Err(error);
                    }

                    attempt += 1;
                    match self.retry_policy.delay_for_attempt(attempt) {
                        Some(delay) => {
                            self.metrics.record_retried(&key);
                            warn!(
                                asset_id = %job.asset_id(),
                                attempt,
                                error = %error,
                                "job retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => break Err(error),
                    }
                }
            }
        };

        match outcome {
            Ok(()) => {
                self.metrics.record_completed(&key, started.elapsed());
                info!(asset_id = %job.asset_id(), "job completed");

                if let Some(batch_id) = job.batch_id() {
                    self.batch_status.update(batch_id, BatchStatus::InProgress).await;
                }
            }
            Err(error) => {
                self.metrics.record_failed(&key);
                self.metrics.record_dead_lettered(&key);
                error!(asset_id = %job.asset_id(), error = %error, attempt, "job dead-lettered");
                self.dlq.send(&job, attempt, error.to_string()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{ArchivistJob, Priority};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingHandler {
        calls: AtomicUsize,
        fail_times: usize,
    }

    #[async_trait::async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, _job: &Job) -> Result<(), Error> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(Error::network("transient"))
            } else {
                Ok(())
            }
        }
    }

    fn sample_job() -> Job {
        Job::Archivist(ArchivistJob {
            tenant_id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            batch_id: None,
            processing_type: Priority::Standard,
        })
    }

    #[test]
    fn test_metrics_key_combines_worker_and_priority() {
        let job = sample_job();
        assert_eq!(metrics_key(&job), "archivist:standard");
    }
}
