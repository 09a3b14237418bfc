//! In-process job metrics: per-(worker, job_type) counters and a rolling
//! latency window, kept in memory and rendered as flat JSON for the
//! control plane's `/metrics` endpoint.
//!
//! Unlike the queue and DLQ, these counters are intentionally
//! process-local — they reset on restart and are never shared across
//! worker instances, since they exist to answer "how is this process
//! doing right now", not to be a durable metrics backend.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const LATENCY_WINDOW: usize = 256;

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    latencies_ms: std::sync::Mutex<Vec<u64>>,
}

impl Counters {
    fn record_latency(&self, ms: u64) {
        let mut latencies = self.latencies_ms.lock().unwrap_or_else(|e| e.into_inner());
        latencies.push(ms);
        if latencies.len() > LATENCY_WINDOW {
            let overflow = latencies.len() - LATENCY_WINDOW;
            latencies.drain(0..overflow);
        }
    }

    fn snapshot(&self) -> JobTypeMetrics {
        let latencies = self.latencies_ms.lock().unwrap_or_else(|e| e.into_inner());
        let avg_latency_ms = if latencies.is_empty() {
            0
        } else {
            latencies.iter().sum::<u64>() / latencies.len() as u64
        };

        JobTypeMetrics {
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            avg_latency_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobTypeMetrics {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub avg_latency_ms: u64,
}

/// Metrics registry keyed by `"<worker>:<job_type>"`, shared across the
/// worker loop and the control plane via an `Arc`.
#[derive(Debug, Default, Clone)]
pub struct JobMetrics {
    by_key: std::sync::Arc<DashMap<String, Counters>>,
}

impl JobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> dashmap::mapref::one::Ref<'_, String, Counters> {
        self.by_key.entry(key.to_string()).or_default();
        self.by_key.get(key).expect("entry just inserted")
    }

    pub fn record_started(&self, key: &str) {
        self.entry(key).started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, key: &str, duration: Duration) {
        let counters = self.entry(key);
        counters.completed.fetch_add(1, Ordering::Relaxed);
        counters.record_latency(duration.as_millis() as u64);
    }

    pub fn record_failed(&self, key: &str) {
        self.entry(key).failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retried(&self, key: &str) {
        self.entry(key).retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self, key: &str) {
        self.entry(key).dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    /// A flat snapshot of every key observed so far, suitable for direct
    /// JSON serialization.
    pub fn snapshot(&self) -> std::collections::BTreeMap<String, JobTypeMetrics> {
        self.by_key
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_counts_per_key() {
        let metrics = JobMetrics::new();
        metrics.record_started("machinist:instant");
        metrics.record_completed("machinist:instant", Duration::from_millis(100));
        metrics.record_started("archivist:standard");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot["machinist:instant"].started, 1);
        assert_eq!(snapshot["machinist:instant"].completed, 1);
        assert_eq!(snapshot["archivist:standard"].started, 1);
        assert_eq!(snapshot["archivist:standard"].completed, 0);
    }

    #[test]
    fn test_latency_window_caps_and_averages() {
        let metrics = JobMetrics::new();
        for ms in [100u64, 200, 300] {
            metrics.record_completed("machinist:instant", Duration::from_millis(ms));
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot["machinist:instant"].avg_latency_ms, 200);
    }
}
