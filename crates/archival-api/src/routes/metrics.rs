//! `GET /metrics` (§4.9): the control-plane process's own in-memory job
//! metrics (almost always empty, since the workers that actually execute
//! jobs run in separate processes) plus a live queue-depth exposition.

use archival_core::jobs::{job::Worker, router::lanes_for_worker};
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn metrics(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mut queues = serde_json::Map::new();
    for worker in [Worker::Machinist, Worker::Archivist] {
        for lane in lanes_for_worker(worker) {
            queues.insert(lane.key(), json!(state.queue.lane_depth(lane).await?));
        }
    }
    queues.insert("dlq:machinist".to_string(), json!(state.dlq.depth(Worker::Machinist).await?));
    queues.insert("dlq:archivist".to_string(), json!(state.dlq.depth(Worker::Archivist).await?));

    Ok(Json(json!({
        "jobs": state.metrics.snapshot(),
        "queues": queues,
    })))
}
