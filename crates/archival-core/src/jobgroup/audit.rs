//! Append-only audit trail for jobgroup lifecycle events (§4.8 "Audit").
//! One JSON line per event under `<AUDIT_DIR>/jobgroup-<YYYY-MM-DD>.log`.
//! Writes are best-effort: a failure here is logged and swallowed, never
//! propagated to the caller's own success/failure path.

use chrono::Utc;
use serde_json::{json, Value as Json};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone)]
pub struct JobgroupAuditLog {
    dir: PathBuf,
}

impl JobgroupAuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record(&self, jobgroup_id: Uuid, event: &str, detail: Json) {
        if let Err(e) = self.try_record(jobgroup_id, event, detail) {
            warn!(jobgroup_id = %jobgroup_id, event, error = %e, "failed to append jobgroup audit record");
        }
    }

    fn try_record(&self, jobgroup_id: Uuid, event: &str, detail: Json) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let now = Utc::now();
        let path = self.dir.join(format!("jobgroup-{}.log", now.format("%Y-%m-%d")));

        let line = json!({
            "jobgroup_id": jobgroup_id,
            "event": event,
            "detail": detail,
            "recorded_at": now.to_rfc3339(),
        });

        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_writes_a_json_line() {
        let tmp = std::env::temp_dir().join(format!("archival-audit-test-{}", Uuid::new_v4()));
        let log = JobgroupAuditLog::new(&tmp);
        log.record(Uuid::nil(), "created", json!({"request_count": 3}));

        let entries: Vec<_> = std::fs::read_dir(&tmp).unwrap().collect();
        assert_eq!(entries.len(), 1);

        std::fs::remove_dir_all(&tmp).ok();
    }
}
