//! The Archivist pipeline (§4.7): generate an AI description for a single
//! asset, or — when the job's priority resolved to `jobgroup` — hand it
//! off to the jobgroup accumulation buffer instead of calling the model
//! directly.

use crate::db::AiDescriptionRepository;
use crate::jobs::job::{ArchivistJob, Job, Priority};
use crate::jobs::worker::JobHandler;
use crate::media::{derivative_key, BlobStore, Derivative};
use crate::pipelines::image_ops;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value as Json};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Hard ceiling on the re-encoded image handed to the model API.
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Quality steps tried, in order, until the re-encode fits `MAX_IMAGE_BYTES`.
const QUALITY_LADDER: &[u8] = &[85, 80, 70, 60, 50, 40];

/// Hard ceiling on the model's JSON response body.
const MAX_RESPONSE_BYTES: usize = 500 * 1024;

/// Tags the model is allowed to emit; anything else is dropped during
/// normalization.
pub const ALLOWED_TAGS: &[&str] = &[
    "portrait", "landscape", "architecture", "document", "people", "nature", "urban", "interior",
    "exterior", "black_and_white", "color", "artifact", "text", "map", "diagram", "event",
];

const MAX_KEYWORDS: usize = 30;

/// Implemented by the jobgroup subsystem; kept as a trait here so the
/// pipeline crate boundary doesn't require `pipelines` to depend on
/// `jobgroup`'s concrete types.
#[async_trait]
pub trait JobgroupDelegate: Send + Sync {
    /// Accept one individual job into the pending accumulation buffer for
    /// its tenant, to be folded into a future batch submission.
    async fn accept_pending(&self, job: &ArchivistJob) -> Result<()>;
}

pub struct ArchivistPipeline {
    blob_store: BlobStore,
    ai_descriptions: AiDescriptionRepository,
    http: reqwest::Client,
    model_base_url: String,
    model_api_key: Option<String>,
    model_name: String,
    sharp_timeout: Duration,
    jobgroup_delegate: Option<Arc<dyn JobgroupDelegate>>,
}

impl ArchivistPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        blob_store: BlobStore,
        ai_descriptions: AiDescriptionRepository,
        model_base_url: String,
        model_api_key: Option<String>,
        model_name: String,
        sharp_timeout: Duration,
        jobgroup_delegate: Option<Arc<dyn JobgroupDelegate>>,
    ) -> Self {
        Self {
            blob_store,
            ai_descriptions,
            http: reqwest::Client::new(),
            model_base_url,
            model_api_key,
            model_name,
            sharp_timeout,
            jobgroup_delegate,
        }
    }

    async fn download_source_image(&self, job: &ArchivistJob) -> Result<Vec<u8>> {
        let bucket = self.blob_store.buckets().standard.clone();
        let ai_key = derivative_key(job.tenant_id, job.batch_id, job.asset_id, Derivative::Ai);
        let viewing_key = derivative_key(job.tenant_id, job.batch_id, job.asset_id, Derivative::Viewing);

        let (_, bytes) = self
            .blob_store
            .get_first_existing(&bucket, &[ai_key, viewing_key])
            .await?;
        Ok(bytes)
    }

    async fn reencode_for_model(&self, source: Vec<u8>) -> Result<String> {
        let timeout = self.sharp_timeout;
        let bytes = image_ops::guarded(timeout, move || {
            let format = image_ops::validate_magic_bytes(&source)?;
            let decoded = image_ops::decode(&source, format)?;
            image_ops::reencode_under_size(&decoded, MAX_IMAGE_BYTES, QUALITY_LADDER)
        })
        .await?;

        use base64::Engine as _;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    fn build_prompt(&self, job: &ArchivistJob, image_b64: &str) -> Json {
        let system_text = "You are an archival cataloging assistant. Describe the attached image \
            for a digital preservation record. Respond with a single JSON object only.";

        let user_text = format!(
            "tenant_id={} asset_id={} batch_id={} allowed_tags={}",
            job.tenant_id,
            job.asset_id,
            job.batch_id.map(|id| id.to_string()).unwrap_or_else(|| "none".to_string()),
            ALLOWED_TAGS.join(",")
        );

        json!({
            "model": self.model_name,
            "messages": [
                {"role": "system", "content": system_text},
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": user_text},
                        {"type": "image_url", "image_url": {"url": format!("data:image/jpeg;base64,{}", image_b64)}},
                    ],
                },
            ],
        })
    }

    async fn call_model(&self, body: &Json) -> Result<String> {
        let mut request = self.http.post(format!("{}/chat/completions", self.model_base_url)).json(body);
        if let Some(key) = &self.model_api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| Error::external_api(e.to_string()))?;
        let status = response.status();

        if status.is_success() {
            response.text().await.map_err(|e| Error::external_api(e.to_string()))
        } else if status.as_u16() == 429 || status.is_server_error() {
            Err(Error::external_api(format!("model api returned {}", status)))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Other(format!("model api rejected request ({}): {}", status, body)))
        }
    }

    fn extract_message_content(response_body: &str) -> Result<String> {
        let value: Json = serde_json::from_str(response_body).map_err(Error::Serialization)?;
        value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Json::as_str)
            .map(|s| s.to_string())
            .ok_or_else(|| Error::external_api("model response missing choices[0].message.content"))
    }

    /// Exposed at crate visibility so the jobgroup result processor can run
    /// the same recovery/normalization path the individual pipeline uses.
    pub(crate) fn parse_description_json(raw: &str) -> Json {
        if raw.len() > MAX_RESPONSE_BYTES {
            return json!({});
        }

        let without_fences = strip_code_fences(raw);
        let start = without_fences.find('{');
        let end = without_fences.rfind('}');

        let (Some(start), Some(end)) = (start, end) else {
            return json!({});
        };
        if end < start {
            return json!({});
        }

        let candidate = strip_trailing_commas(&without_fences[start..=end]);
        serde_json::from_str(&candidate).unwrap_or_else(|_| json!({}))
    }

    pub(crate) fn normalize(raw: Json) -> Json {
        let mut normalized = Map::new();

        if let Some(tags) = raw.get("tags").and_then(Json::as_array) {
            let allowed: Vec<Json> = tags
                .iter()
                .filter_map(Json::as_str)
                .filter(|t| ALLOWED_TAGS.contains(t))
                .map(|t| json!(t))
                .collect();
            normalized.insert("tags".to_string(), Json::Array(allowed));
        }

        if let Some(keywords) = raw.get("keywords").and_then(Json::as_array) {
            let capped: Vec<Json> = keywords.iter().take(MAX_KEYWORDS).cloned().collect();
            normalized.insert("keywords".to_string(), Json::Array(capped));
        }

        if let Some(summary) = raw.get("summary").and_then(Json::as_str) {
            normalized.insert("summary".to_string(), json!(summary));
        }

        for field in ["spatial", "temporal"] {
            if let Some(value) = raw.get(field) {
                normalized.insert(field.to_string(), coerce_block(value));
            }
        }

        Json::Object(normalized)
    }
}

fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "")
}

fn strip_trailing_commas(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let chars: Vec<char> = raw.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn coerce_block(value: &Json) -> Json {
    match value {
        Json::String(s) => json!({ "raw": s }),
        Json::Object(_) => value.clone(),
        _ => json!({}),
    }
}

#[async_trait]
impl JobHandler for ArchivistPipeline {
    async fn handle(&self, job: &Job) -> Result<()> {
        let job = match job {
            Job::Archivist(j) => j,
            Job::Machinist(_) => return Err(Error::routing("archivist pipeline received a machinist job")),
        };

        if job.processing_type == Priority::Jobgroup {
            return match &self.jobgroup_delegate {
                Some(delegate) => delegate.accept_pending(job).await,
                None => Err(Error::config("jobgroup delegate is not configured for this archivist process")),
            };
        }

        let started = Instant::now();
        let started_at = Utc::now();

        let source = self.download_source_image(job).await?;
        let image_b64 = self.reencode_for_model(source).await?;
        let prompt = self.build_prompt(job, &image_b64);
        let response_body = self.call_model(&prompt).await?;
        let content = Self::extract_message_content(&response_body)?;
        let raw_description = Self::parse_description_json(&content);
        let description = Self::normalize(raw_description);

        let telemetry = json!({
            "started_at": started_at.to_rfc3339(),
            "completed_at": Utc::now().to_rfc3339(),
            "duration_ms": started.elapsed().as_millis() as u64,
            "model": self.model_name,
        });

        self.ai_descriptions
            .upsert(job.tenant_id, job.asset_id, description, telemetry)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "\n{\"a\":1}\n");
    }

    #[test]
    fn test_strip_trailing_commas() {
        assert_eq!(strip_trailing_commas("{\"a\":1,}"), "{\"a\":1}");
        assert_eq!(strip_trailing_commas("[1,2,]"), "[1,2]");
    }

    #[test]
    fn test_parse_description_json_recovers_from_fenced_payload() {
        let raw = "Here you go:\n```json\n{\"tags\": [\"portrait\", \"unlisted\"],}\n```";
        let parsed = ArchivistPipeline::parse_description_json(raw);
        assert_eq!(parsed["tags"][0], "portrait");
    }

    #[test]
    fn test_parse_description_json_returns_empty_on_garbage() {
        let parsed = ArchivistPipeline::parse_description_json("not json at all");
        assert_eq!(parsed, json!({}));
    }

    #[test]
    fn test_normalize_drops_disallowed_tags() {
        let raw = json!({"tags": ["portrait", "not_a_real_tag"], "keywords": ["a", "b"]});
        let normalized = ArchivistPipeline::normalize(raw);
        assert_eq!(normalized["tags"].as_array().unwrap().len(), 1);
        assert_eq!(normalized["keywords"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_normalize_caps_keywords_at_thirty() {
        let keywords: Vec<Json> = (0..40).map(|i| json!(format!("k{}", i))).collect();
        let raw = json!({"keywords": keywords});
        let normalized = ArchivistPipeline::normalize(raw);
        assert_eq!(normalized["keywords"].as_array().unwrap().len(), MAX_KEYWORDS);
    }
}
