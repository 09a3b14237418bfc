//! Background job processing: the namespaced priority queues, the
//! Machinist/Archivist job payload types, validation and routing, the
//! retry/dead-letter/metrics machinery, and the single-loop worker that
//! ties them together.

pub mod batch_status;
pub mod config;
pub mod dead_letter;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod router;
pub mod validate;
pub mod worker;

pub use batch_status::{BatchStatus, BatchStatusTracker};
pub use config::JobConfig;
pub use dead_letter::{DeadLetterQueue, DlqEntry};
pub use job::{ArchivistJob, FilePurpose, Job, MachinistJob, Priority, Worker};
pub use metrics::{JobMetrics, JobTypeMetrics};
pub use queue::JobQueue;
pub use retry::{with_retry, RetryPolicy};
pub use router::{lanes_for_worker, resolve_queue, resolve_worker, QueueLane};
pub use validate::validate_job;
pub use worker::{JobHandler, WorkerLoop};
