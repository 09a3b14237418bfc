//! The job payload sum type and the enumerated fields it carries.
//!
//! A job is always one of two shapes on the wire: a Machinist job or an
//! Archivist job, discriminated by `job_type`. There is deliberately no
//! generic `Job` struct with an untyped `payload: Value` — that dynamic
//! shape is exactly what this module replaces with a tagged variant per
//! worker, per the spec's design note on queue payload typing.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which worker process a job belongs to, derived from the `job_type` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Worker {
    Machinist,
    Archivist,
}

impl Worker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Worker::Machinist => "machinist",
            Worker::Archivist => "archivist",
        }
    }

    /// Derive from a `job_type` string by prefix match (`machinist*`, `archivist*`).
    pub fn from_job_type(job_type: &str) -> Option<Self> {
        if job_type.starts_with("machinist") {
            Some(Worker::Machinist)
        } else if job_type.starts_with("archivist") {
            Some(Worker::Archivist)
        } else {
            None
        }
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Destination lane within a worker's queue set, derived from `processing_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Instant,
    Standard,
    Jobgroup,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Instant => "instant",
            Priority::Standard => "standard",
            Priority::Jobgroup => "jobgroup",
        }
    }

    /// Normalize a raw `processing_type` string: `instant|individual` ->
    /// instant, `standard` -> standard, `jobgroup|batch` -> jobgroup,
    /// anything else (including absent) -> standard.
    pub fn from_processing_type(raw: Option<&str>) -> Self {
        match raw.map(|s| s.to_ascii_lowercase()) {
            Some(ref s) if s == "instant" || s == "individual" => Priority::Instant,
            Some(ref s) if s == "jobgroup" || s == "batch" => Priority::Jobgroup,
            Some(ref s) if s == "standard" => Priority::Standard,
            _ => Priority::Standard,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The named role a Machinist derivative set is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePurpose {
    Preservation,
    Viewing,
    Production,
    Restoration,
}

impl FilePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilePurpose::Preservation => "preservation",
            FilePurpose::Viewing => "viewing",
            FilePurpose::Production => "production",
            FilePurpose::Restoration => "restoration",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "preservation" => Some(FilePurpose::Preservation),
            "viewing" => Some(FilePurpose::Viewing),
            "production" => Some(FilePurpose::Production),
            "restoration" => Some(FilePurpose::Restoration),
            _ => None,
        }
    }
}

impl fmt::Display for FilePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated Machinist job: produce derivatives for one asset under one
/// named purpose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachinistJob {
    pub tenant_id: Uuid,
    pub asset_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub file_purpose: FilePurpose,
    /// Normalized (lowercased, leading dot stripped), already allow-listed.
    pub input_extension: String,
    pub priority: Priority,
}

/// A validated Archivist job: generate (or delegate generation of) an AI
/// description for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivistJob {
    pub tenant_id: Uuid,
    pub asset_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub processing_type: Priority,
}

/// The validated, typed job payload placed on and taken off a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "worker", rename_all = "snake_case")]
pub enum Job {
    Machinist(MachinistJob),
    Archivist(ArchivistJob),
}

impl Job {
    pub fn worker(&self) -> Worker {
        match self {
            Job::Machinist(_) => Worker::Machinist,
            Job::Archivist(_) => Worker::Archivist,
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            Job::Machinist(j) => j.priority,
            Job::Archivist(j) => j.processing_type,
        }
    }

    pub fn tenant_id(&self) -> Uuid {
        match self {
            Job::Machinist(j) => j.tenant_id,
            Job::Archivist(j) => j.tenant_id,
        }
    }

    pub fn asset_id(&self) -> Uuid {
        match self {
            Job::Machinist(j) => j.asset_id,
            Job::Archivist(j) => j.asset_id,
        }
    }

    pub fn batch_id(&self) -> Option<Uuid> {
        match self {
            Job::Machinist(j) => j.batch_id,
            Job::Archivist(j) => j.batch_id,
        }
    }

    /// The `job_type` string this job round-trips through the wire as,
    /// e.g. `machinist` / `archivist`. Queue payloads store the worker tag
    /// at top level (see `Self`'s `#[serde(tag = "worker")]`); `job_type`
    /// is reconstructed for callers (such as the control plane) that think
    /// in terms of the original wire vocabulary.
    pub fn job_type(&self) -> &'static str {
        self.worker().as_str()
    }

    /// Serialize for placement on a queue list.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Parse a raw queue element back into a typed job. Distinct from
    /// *validation* (`jobs::validate`), which checks field-level
    /// constraints on first ingestion; this is the trusted round-trip path
    /// for jobs the router has already accepted.
    pub fn from_json(value: &serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_from_job_type_prefix() {
        assert_eq!(Worker::from_job_type("machinist"), Some(Worker::Machinist));
        assert_eq!(Worker::from_job_type("machinist.viewing"), Some(Worker::Machinist));
        assert_eq!(Worker::from_job_type("archivist"), Some(Worker::Archivist));
        assert_eq!(Worker::from_job_type("unknown"), None);
    }

    #[test]
    fn test_priority_normalization() {
        assert_eq!(Priority::from_processing_type(Some("individual")), Priority::Instant);
        assert_eq!(Priority::from_processing_type(Some("instant")), Priority::Instant);
        assert_eq!(Priority::from_processing_type(Some("batch")), Priority::Jobgroup);
        assert_eq!(Priority::from_processing_type(Some("jobgroup")), Priority::Jobgroup);
        assert_eq!(Priority::from_processing_type(Some("whatever")), Priority::Standard);
        assert_eq!(Priority::from_processing_type(None), Priority::Standard);
    }

    #[test]
    fn test_job_round_trip() {
        let job = Job::Machinist(MachinistJob {
            tenant_id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            batch_id: None,
            file_purpose: FilePurpose::Viewing,
            input_extension: "jpg".to_string(),
            priority: Priority::Instant,
        });

        let value = job.to_json().unwrap();
        let parsed = Job::from_json(&value).unwrap();
        assert_eq!(parsed.asset_id(), job.asset_id());
        assert_eq!(parsed.worker(), Worker::Machinist);
    }
}
