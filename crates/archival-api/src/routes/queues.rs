//! Queue/DLQ inspection and maintenance routes (§4.9, all auth):
//! `GET /queues/overview`, `GET /queues/dlq`, `POST /queues/dlq/requeue`,
//! `DELETE /queues/dlq`.

use archival_core::jobs::{job::Worker, router::lanes_for_worker};
use archival_core::Error;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

const MAX_DLQ_RANGE_LIMIT: i64 = 200;
const MAX_REQUEUE_COUNT: i64 = 1000;
const MAX_PURGE_COUNT: i64 = 1000;

fn known_dlq_keys() -> [String; 2] {
    [format!("dlq:{}", Worker::Machinist.as_str()), format!("dlq:{}", Worker::Archivist.as_str())]
}

fn require_known_key(key: &str) -> Result<(), ApiError> {
    if known_dlq_keys().iter().any(|k| k == key) {
        Ok(())
    } else {
        Err(ApiError::from(Error::validation(format!("unknown dead-letter queue key '{}'", key))))
    }
}

pub async fn overview(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mut queues = serde_json::Map::new();
    for worker in [Worker::Machinist, Worker::Archivist] {
        for lane in lanes_for_worker(worker) {
            queues.insert(lane.key(), json!(state.queue.lane_depth(lane).await?));
        }
    }
    for key in known_dlq_keys() {
        let worker = if key.ends_with("machinist") { Worker::Machinist } else { Worker::Archivist };
        queues.insert(key, json!(state.dlq.depth(worker).await?));
    }
    Ok(Json(json!({"queues": queues})))
}

#[derive(Debug, Deserialize)]
pub struct DlqRangeQuery {
    key: String,
    #[serde(default)]
    offset: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Raw dead-letter entries, parsed best-effort as JSON for display;
/// malformed entries are surfaced as an opaque string rather than dropped,
/// since this is an operator-facing browse endpoint, not a consumer path.
pub async fn dlq_range(
    State(state): State<AppState>,
    Query(query): Query<DlqRangeQuery>,
) -> Result<Json<Value>, ApiError> {
    require_known_key(&query.key)?;
    let limit = query.limit.clamp(0, MAX_DLQ_RANGE_LIMIT);
    let offset = query.offset.max(0);

    let mut conn = state.redis.get().await.map_err(Error::from)?;
    let raw = conn
        .lrange(&query.key, offset, offset + limit - 1)
        .await
        .map_err(Error::from)?;

    let entries: Vec<Value> = raw
        .iter()
        .map(|bytes| serde_json::from_slice::<Value>(bytes).unwrap_or_else(|_| json!(String::from_utf8_lossy(bytes))))
        .collect();

    Ok(Json(json!({"key": query.key, "offset": offset, "limit": limit, "entries": entries})))
}

#[derive(Debug, Deserialize)]
pub struct RequeueRequest {
    src_key: String,
    dst_key: String,
    count: i64,
}

/// Right-pop up to `count` entries from `src_key` and right-push them onto
/// `dst_key`, preserving relative order.
pub async fn dlq_requeue(
    State(state): State<AppState>,
    Json(request): Json<RequeueRequest>,
) -> Result<Json<Value>, ApiError> {
    let count = request.count.clamp(0, MAX_REQUEUE_COUNT);

    let mut conn = state.redis.get().await.map_err(Error::from)?;
    let mut moved = 0i64;
    for _ in 0..count {
        match conn.rpop(&request.src_key).await.map_err(Error::from)? {
            Some(bytes) => {
                conn.rpush(&request.dst_key, &bytes).await.map_err(Error::from)?;
                moved += 1;
            }
            None => break,
        }
    }

    Ok(Json(json!({"src_key": request.src_key, "dst_key": request.dst_key, "moved": moved})))
}

#[derive(Debug, Deserialize)]
pub struct PurgeRequest {
    key: String,
    count: i64,
}

/// Right-pop up to `count` entries from `key` and discard them.
pub async fn dlq_purge(
    State(state): State<AppState>,
    Json(request): Json<PurgeRequest>,
) -> Result<Json<Value>, ApiError> {
    require_known_key(&request.key)?;
    let count = request.count.clamp(0, MAX_PURGE_COUNT);

    let mut conn = state.redis.get().await.map_err(Error::from)?;
    let mut purged = 0i64;
    for _ in 0..count {
        match conn.rpop(&request.key).await.map_err(Error::from)? {
            Some(_) => purged += 1,
            None => break,
        }
    }

    Ok(Json(json!({"key": request.key, "purged": purged})))
}
