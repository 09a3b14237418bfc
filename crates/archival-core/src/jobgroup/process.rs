//! Jobgroup result processing (§4.8 "Result processing"): turn a
//! completed batch's output file into `ai_descriptions` and
//! `jobgroup_results` rows, chunked with bounded concurrency.

use crate::cache::lock::DistributedLock;
use crate::db::asset_version::AssetVersionRepository;
use crate::db::jobgroup::{JobgroupRepository, JobgroupStatus};
use crate::db::jobgroup_result::JobgroupResultRepository;
use crate::db::ai_description::AiDescriptionRepository;
use crate::jobgroup::audit::JobgroupAuditLog;
use crate::jobgroup::batch_client::BatchApiClient;
use crate::jobs::dead_letter::DeadLetterQueue;
use crate::jobs::job::Worker;
use crate::pipelines::archivist::ArchivistPipeline;
use crate::webhook::WebhookNotifier;
use crate::{Error, Result};
use serde_json::{json, Value as Json};
use tracing::warn;
use uuid::Uuid;

/// Chunk size for bounded-concurrency result processing.
const CHUNK_SIZE: usize = 25;

pub struct JobgroupResultProcessor {
    jobgroups: JobgroupRepository,
    results: JobgroupResultRepository,
    ai_descriptions: AiDescriptionRepository,
    asset_versions: AssetVersionRepository,
    client: BatchApiClient,
    audit: JobgroupAuditLog,
    dlq: DeadLetterQueue,
    webhook: WebhookNotifier,
}

struct Tally {
    processed: usize,
    failed: usize,
    skipped: usize,
}

impl JobgroupResultProcessor {
    pub fn new(
        jobgroups: JobgroupRepository,
        results: JobgroupResultRepository,
        ai_descriptions: AiDescriptionRepository,
        asset_versions: AssetVersionRepository,
        client: BatchApiClient,
        audit: JobgroupAuditLog,
        dlq: DeadLetterQueue,
        webhook: WebhookNotifier,
    ) -> Self {
        Self { jobgroups, results, ai_descriptions, asset_versions, client, audit, dlq, webhook }
    }

    pub async fn process_completed(&self, jobgroup_id: Uuid, output_file_id: &str, lock: &DistributedLock) -> Result<()> {
        let output = self.client.get_file_content(output_file_id).await?;
        self.process_completed_bytes(jobgroup_id, &output, lock).await
    }

    /// Same as `process_completed`, but takes the output file's bytes
    /// directly rather than fetching them from the batch API. Used by the
    /// poller's mock-directory mode (§4.8 "Polling contract" step 2), which
    /// reads output files from disk and skips remote status entirely.
    ///
    /// `lock` is the distributed poller lock the caller already holds for
    /// this cycle; its TTL is refreshed after every chunk (§4.8 "Result
    /// processing" step 3, §9) so a jobgroup with many chunks of results
    /// can't outlive the lock mid-processing.
    pub async fn process_completed_bytes(&self, jobgroup_id: Uuid, output: &[u8], lock: &DistributedLock) -> Result<()> {
        let lines: Vec<Json> = String::from_utf8_lossy(output)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();

        let existing = self.results.count_for_jobgroup(jobgroup_id).await?;
        if existing as usize == lines.len() && !lines.is_empty() {
            self.jobgroups
                .transition(
                    jobgroup_id,
                    JobgroupStatus::Completed,
                    Some(json!({"processed": existing, "shortcut": "already_complete"})),
                )
                .await?;
            self.webhook
                .notify("jobgroup.completed", json!({"jobgroup_id": jobgroup_id, "processed": existing, "shortcut": "already_complete"}))
                .await;
            return Ok(());
        }

        let mut tally = Tally { processed: 0, failed: 0, skipped: 0 };

        for chunk in lines.chunks(CHUNK_SIZE) {
            let outcomes = futures::future::join_all(chunk.iter().map(|record| self.process_record(jobgroup_id, record))).await;
            lock.refresh().await;
            for outcome in outcomes {
                match outcome {
                    RecordOutcome::Processed => tally.processed += 1,
                    RecordOutcome::Skipped => tally.skipped += 1,
                    RecordOutcome::Failed => tally.failed += 1,
                }
            }
        }

        let final_status = if tally.failed > 0 { JobgroupStatus::Failed } else { JobgroupStatus::Completed };
        let notes = json!({"processed": tally.processed, "failed": tally.failed, "skipped": tally.skipped});
        self.jobgroups.transition(jobgroup_id, final_status, Some(notes.clone())).await?;
        self.audit.record(jobgroup_id, final_status.as_str(), notes.clone());

        let event = if final_status == JobgroupStatus::Completed { "jobgroup.completed" } else { "jobgroup.failed" };
        let mut payload = notes;
        payload["jobgroup_id"] = json!(jobgroup_id);
        self.webhook.notify(event, payload).await;

        Ok(())
    }

    async fn process_record(&self, jobgroup_id: Uuid, record: &Json) -> RecordOutcome {
        let custom_id = match record.get("custom_id").and_then(Json::as_str) {
            Some(id) => id,
            None => return RecordOutcome::Skipped,
        };

        let asset_id = match custom_id.strip_prefix("asset-").and_then(|s| Uuid::parse_str(s).ok()) {
            Some(id) => id,
            None => {
                warn!(custom_id, "malformed custom_id in jobgroup output, skipping");
                return RecordOutcome::Skipped;
            }
        };

        match self.results.exists(jobgroup_id, asset_id).await {
            Ok(true) => return RecordOutcome::Skipped,
            Ok(false) => {}
            Err(e) => {
                warn!(asset_id = %asset_id, error = %e, "failed to check jobgroup_results idempotency");
                return RecordOutcome::Failed;
            }
        }

        match self.apply_record(jobgroup_id, asset_id, custom_id, record).await {
            Ok(()) => RecordOutcome::Processed,
            Err(e) => {
                warn!(asset_id = %asset_id, error = %e, "jobgroup result processing failed");
                let tenant_id = self
                    .asset_versions
                    .tenant_and_batch_for_asset(asset_id)
                    .await
                    .ok()
                    .flatten();
                let _ = self
                    .results
                    .upsert(jobgroup_id, asset_id, custom_id, "failed", Some(e.category()), Some(&e.to_string()), Some(record.clone()))
                    .await;
                let (tenant_id, batch_id) = tenant_id.unwrap_or((Uuid::nil(), None));
                self.dlq
                    .send_synthetic(Worker::Archivist, tenant_id, asset_id, batch_id, "archivist.jobgroup-result", e.to_string())
                    .await;
                RecordOutcome::Failed
            }
        }
    }

    async fn apply_record(&self, jobgroup_id: Uuid, asset_id: Uuid, custom_id: &str, record: &Json) -> Result<()> {
        let (tenant_id, _batch_id) = self
            .asset_versions
            .tenant_and_batch_for_asset(asset_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("no asset_versions row for asset {}", asset_id)))?;

        if let Some(error) = record.get("error").filter(|e| !e.is_null()) {
            return Err(Error::external_api(format!("batch output carries an error for {}: {}", custom_id, error)));
        }

        let body = record
            .get("response")
            .and_then(|r| r.get("body"))
            .ok_or_else(|| Error::external_api("batch output record missing response.body"))?;

        let content = extract_message_content(body).ok_or_else(|| Error::external_api("no message content in batch output"))?;

        let raw_description = ArchivistPipeline::parse_description_json(&content);
        let description = ArchivistPipeline::normalize(raw_description);

        self.ai_descriptions.upsert(tenant_id, asset_id, description, json!({"source": "jobgroup"})).await?;
        self.results.upsert(jobgroup_id, asset_id, custom_id, "completed", None, None, None).await?;

        Ok(())
    }
}

enum RecordOutcome {
    Processed,
    Skipped,
    Failed,
}

fn extract_message_content(body: &Json) -> Option<String> {
    let content = body.get("choices")?.get(0)?.get("message")?.get("content")?;

    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }

    if let Some(parts) = content.as_array() {
        let joined = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Json::as_str))
            .collect::<Vec<_>>()
            .join("");
        if !joined.is_empty() {
            return Some(joined);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_message_content_from_plain_string() {
        let body = json!({"choices": [{"message": {"content": "hello"}}]});
        assert_eq!(extract_message_content(&body), Some("hello".to_string()));
    }

    #[test]
    fn test_extract_message_content_from_parts() {
        let body = json!({"choices": [{"message": {"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]}}]});
        assert_eq!(extract_message_content(&body), Some("ab".to_string()));
    }

    #[test]
    fn test_extract_message_content_missing_returns_none() {
        assert_eq!(extract_message_content(&json!({})), None);
    }
}
