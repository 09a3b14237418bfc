//! Shared state threaded through every control-plane handler.
//!
//! Built once at process start from an explicit `Config`, never behind a
//! global singleton — the same dependency-injection posture `archival-core`
//! uses for its worker bootstraps.

use archival_core::jobs::dead_letter::DeadLetterQueue;
use archival_core::jobs::metrics::JobMetrics;
use archival_core::jobs::queue::JobQueue;
use archival_core::{Config, Database, RedisPool};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub redis: RedisPool,
    pub db: Option<Database>,
    pub queue: JobQueue,
    pub dlq: DeadLetterQueue,
    pub metrics: JobMetrics,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        redis: RedisPool,
        db: Option<Database>,
        queue: JobQueue,
        dlq: DeadLetterQueue,
        metrics: JobMetrics,
    ) -> Self {
        Self { config, redis, db, queue, dlq, metrics }
    }
}
