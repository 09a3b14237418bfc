//! Jobgroup submission (§4.8 "Submission contract"): assemble a set of
//! individual archivist jobs into one offline batch, upload it, and create
//! the remote jobgroup.

use crate::db::jobgroup::{Jobgroup, JobgroupRepository, JobgroupStatus};
use crate::jobgroup::audit::JobgroupAuditLog;
use crate::jobgroup::batch_client::BatchApiClient;
use crate::jobs::job::ArchivistJob;
use crate::pipelines::working_dir::WorkingDir;
use crate::webhook::WebhookNotifier;
use crate::{Error, Result};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

/// Maximum number of jobgroups a tenant may create within a rolling 24h
/// window.
const MAX_JOBGROUPS_PER_DAY: i64 = 5;

pub struct JobgroupSubmitter {
    repo: JobgroupRepository,
    client: BatchApiClient,
    audit: JobgroupAuditLog,
    webhook: WebhookNotifier,
}

pub struct SubmissionOutcome {
    pub jobgroup_id: Uuid,
    pub external_jobgroup_id: String,
    pub input_file_id: String,
    pub status: String,
    pub request_count: i32,
}

impl JobgroupSubmitter {
    pub fn new(repo: JobgroupRepository, client: BatchApiClient, audit: JobgroupAuditLog, webhook: WebhookNotifier) -> Self {
        Self { repo, client, audit, webhook }
    }

    /// Submit a homogeneous batch of jobs (same tenant, same batch_id) as a
    /// single jobgroup. Callers must have already enforced homogeneity;
    /// `tenant_id`/`batch_id` are derived from the first job here purely
    /// for bookkeeping.
    pub async fn submit(&self, jobs: Vec<ArchivistJob>) -> Result<SubmissionOutcome> {
        let first = jobs.first().ok_or_else(|| Error::validation("jobgroup submission requires at least one job"))?;
        let tenant_id = first.tenant_id;
        let batch_id = first.batch_id;

        if self.repo.has_active_for_tenant(tenant_id).await? {
            return Err(Error::validation(format!(
                "tenant {} already has an active jobgroup; at most one may be in flight at a time",
                tenant_id
            )));
        }

        let recent = self.repo.count_recent_for_tenant(tenant_id).await?;
        if recent >= MAX_JOBGROUPS_PER_DAY {
            return Err(Error::validation(format!(
                "tenant {} has already created {} jobgroups in the last 24 hours",
                tenant_id, recent
            )));
        }

        let working_dir = WorkingDir::create(Uuid::new_v4())?;
        let result = self.run_submission(tenant_id, batch_id, jobs, &working_dir).await;

        if let Err(cleanup_err) = working_dir.remove() {
            warn!(error = %cleanup_err, "failed to remove jobgroup working directory");
        }

        result
    }

    async fn run_submission(
        &self,
        tenant_id: Uuid,
        batch_id: Option<Uuid>,
        jobs: Vec<ArchivistJob>,
        working_dir: &WorkingDir,
    ) -> Result<SubmissionOutcome> {
        let mut lines = Vec::with_capacity(jobs.len());
        for job in &jobs {
            if job.tenant_id != tenant_id || job.batch_id != batch_id {
                warn!(asset_id = %job.asset_id, "skipping job with mismatched tenant/batch in jobgroup submission");
                continue;
            }

            let record = json!({
                "custom_id": format!("asset-{}", job.asset_id),
                "method": "POST",
                "url": "/v1/chat/completions",
                "body": {"asset_id": job.asset_id, "tenant_id": job.tenant_id},
            });
            lines.push(serde_json::to_vec(&record).map_err(Error::Serialization)?);
        }

        if lines.is_empty() {
            return Err(Error::validation("no valid jobs survived homogeneity filtering"));
        }

        let mut jsonl = Vec::new();
        for line in &lines {
            jsonl.extend_from_slice(line);
            jsonl.push(b'\n');
        }

        let jsonl_path = working_dir.write_file("batch-input.jsonl", &jsonl)?;

        let input_file_id = self.client.upload_file("batch-input.jsonl", jsonl).await?;

        let metadata = json!({
            "tenant_id": tenant_id,
            "batch_id": batch_id,
            "mode": "jobgroup",
        });
        let remote = self.client.create_batch(&input_file_id, metadata).await?;

        let status = remote_status_to_jobgroup_status(&remote.status);
        let notes = json!({
            "jsonl_path": jsonl_path.to_string_lossy(),
            "work_dir": working_dir.path().to_string_lossy(),
        });

        let row: Jobgroup = self
            .repo
            .create(tenant_id, batch_id, &remote.id, &input_file_id, status, lines.len() as i32, notes)
            .await?;

        self.audit.record(
            row.id,
            "created",
            json!({"request_count": row.request_count, "external_jobgroup_id": row.external_jobgroup_id}),
        );
        self.webhook
            .notify(
                "jobgroup.created",
                json!({
                    "jobgroup_id": row.id,
                    "request_count": row.request_count,
                    "external_jobgroup_id": row.external_jobgroup_id,
                }),
            )
            .await;

        Ok(SubmissionOutcome {
            jobgroup_id: row.id,
            external_jobgroup_id: row.external_jobgroup_id,
            input_file_id: row.input_file_id,
            status: row.status,
            request_count: row.request_count,
        })
    }
}

fn remote_status_to_jobgroup_status(raw: &str) -> JobgroupStatus {
    match raw {
        "validating" => JobgroupStatus::Validating,
        "in_progress" => JobgroupStatus::InProgress,
        "completed" => JobgroupStatus::Completed,
        "failed" => JobgroupStatus::Failed,
        "expired" => JobgroupStatus::Expired,
        "cancelled" => JobgroupStatus::Cancelled,
        _ => JobgroupStatus::Created,
    }
}
