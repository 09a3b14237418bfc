//! Operator-triggered jobgroup cancellation (§4.8 "Cancellation").

use crate::db::jobgroup::{JobgroupRepository, JobgroupStatus};
use crate::jobgroup::audit::JobgroupAuditLog;
use crate::jobgroup::batch_client::BatchApiClient;
use crate::{Error, Result};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

pub async fn cancel_jobgroup(
    repo: &JobgroupRepository,
    client: &BatchApiClient,
    audit: &JobgroupAuditLog,
    jobgroup_id: Uuid,
) -> Result<()> {
    let jobgroup = repo
        .find(jobgroup_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("jobgroup {} not found", jobgroup_id)))?;

    client.cancel_batch(&jobgroup.external_jobgroup_id).await?;

    let notes = json!({"cancelled_at": Utc::now().to_rfc3339()});
    repo.transition(jobgroup_id, JobgroupStatus::Cancelled, Some(notes.clone())).await?;
    audit.record(jobgroup_id, "cancelled", notes);

    Ok(())
}
