//! Best-effort batch status tracking for jobs that carry a `batch_id`.
//!
//! There is no durable `batches` table in the data model — a batch is just
//! the `batch_id` tag shared by a set of jobs — so this tracker lives
//! entirely in Redis as a single string key per batch, holding the status
//! in the `{not_started, in_progress, complete, cancelled}` vocabulary.
//! Writes are fire-and-forget from the job execution envelope after every
//! completed job that carries a `batch_id`; a lost update here never
//! blocks or fails the job itself.

use crate::cache::RedisPool;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    NotStarted,
    InProgress,
    Complete,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::NotStarted => "not_started",
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Complete => "complete",
            BatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "not_started" => Some(BatchStatus::NotStarted),
            "in_progress" => Some(BatchStatus::InProgress),
            "complete" => Some(BatchStatus::Complete),
            "cancelled" => Some(BatchStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses are never overwritten by a later in-progress
    /// update — only an explicit cancel can follow a complete.
    fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Complete | BatchStatus::Cancelled)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn key(batch_id: Uuid) -> String {
    format!("batch_status:{}", batch_id)
}

#[derive(Clone)]
pub struct BatchStatusTracker {
    pool: RedisPool,
}

impl BatchStatusTracker {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Move a batch to `status`, unless it already holds a terminal status.
    /// Swallows Redis errors: this tracker is diagnostic, not authoritative.
    pub async fn update(&self, batch_id: Uuid, status: BatchStatus) {
        let key = key(batch_id);

        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("batch status update for {} skipped, no redis: {}", batch_id, e);
                return;
            }
        };

        let current = match conn.get(&key).await {
            Ok(Some(bytes)) => String::from_utf8(bytes).ok().and_then(|s| BatchStatus::from_str(&s)),
            Ok(None) => None,
            Err(e) => {
                warn!("batch status read for {} failed: {}", batch_id, e);
                None
            }
        };

        if current.map(|c| c.is_terminal()).unwrap_or(false) {
            return;
        }

        if let Err(e) = conn.setex(&key, 7 * 24 * 3600, status.as_str().as_bytes()).await {
            warn!("batch status write for {} failed: {}", batch_id, e);
        }
    }

    pub async fn get(&self, batch_id: Uuid) -> Option<BatchStatus> {
        let mut conn = self.pool.get().await.ok()?;
        let bytes = conn.get(&key(batch_id)).await.ok().flatten()?;
        String::from_utf8(bytes).ok().and_then(|s| BatchStatus::from_str(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(BatchStatus::from_str("in_progress"), Some(BatchStatus::InProgress));
        assert_eq!(BatchStatus::from_str("bogus"), None);
        assert_eq!(BatchStatus::Complete.as_str(), "complete");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(BatchStatus::Complete.is_terminal());
        assert!(BatchStatus::Cancelled.is_terminal());
        assert!(!BatchStatus::InProgress.is_terminal());
        assert!(!BatchStatus::NotStarted.is_terminal());
    }
}
