//! Resolution of a raw `job_type` wire string into a worker and queue lane.

use crate::error::Error;
use crate::jobs::job::{Job, Priority, Worker};

/// The six namespaced queues a job can land in, named `<worker>:<lane>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLane {
    pub worker: Worker,
    pub priority: Priority,
}

impl QueueLane {
    /// The Redis list key this lane lives under, bit-exact with the
    /// `jobs:<worker>:<priority>` convention.
    pub fn key(&self) -> String {
        format!("jobs:{}:{}", self.worker.as_str(), self.priority.as_str())
    }
}

/// Resolve a raw `job_type` string to its worker, returning a routing error
/// if it matches neither the `machinist*` nor `archivist*` prefix.
pub fn resolve_worker(job_type: &str) -> Result<Worker, Error> {
    Worker::from_job_type(job_type)
        .ok_or_else(|| Error::routing(format!("unrecognized job_type '{}'", job_type)))
}

/// Resolve the destination queue lane for an already-validated job.
/// Machinist jobs never carry `Priority::Jobgroup` — that combination is
/// rejected during validation (§4.2 step 3), so this is total only because
/// the caller has already validated the job.
pub fn resolve_queue(job: &Job) -> QueueLane {
    QueueLane {
        worker: job.worker(),
        priority: job.priority(),
    }
}

/// The lanes, in strict-priority polling order, for a given worker.
/// Machinist has two lanes (`instant`, `standard`); Archivist has three,
/// adding `jobgroup` as its lowest-priority lane.
pub fn lanes_for_worker(worker: Worker) -> Vec<QueueLane> {
    match worker {
        Worker::Machinist => vec![
            QueueLane { worker, priority: Priority::Instant },
            QueueLane { worker, priority: Priority::Standard },
        ],
        Worker::Archivist => vec![
            QueueLane { worker, priority: Priority::Instant },
            QueueLane { worker, priority: Priority::Standard },
            QueueLane { worker, priority: Priority::Jobgroup },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_worker() {
        assert_eq!(resolve_worker("machinist").unwrap(), Worker::Machinist);
        assert_eq!(resolve_worker("archivist").unwrap(), Worker::Archivist);
        assert!(resolve_worker("unknown").is_err());
    }

    #[test]
    fn test_lane_key_format() {
        let lane = QueueLane { worker: Worker::Machinist, priority: Priority::Instant };
        assert_eq!(lane.key(), "jobs:machinist:instant");
    }

    #[test]
    fn test_lanes_for_worker_order() {
        let lanes = lanes_for_worker(Worker::Archivist);
        assert_eq!(lanes.len(), 3);
        assert_eq!(lanes[0].priority, Priority::Instant);
        assert_eq!(lanes[1].priority, Priority::Standard);
        assert_eq!(lanes[2].priority, Priority::Jobgroup);
    }

    #[test]
    fn test_machinist_has_no_jobgroup_lane() {
        let lanes = lanes_for_worker(Worker::Machinist);
        assert_eq!(lanes.len(), 2);
        assert!(!lanes.iter().any(|l| l.priority == Priority::Jobgroup));
    }
}
