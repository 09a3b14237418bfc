//! `GET /health` (§4.9): a computed snapshot, not a cached belief — see
//! `archival_core::health::HealthSnapshot::compute`.

use archival_core::health::{HealthSnapshot, QueueDepths};
use archival_core::jobs::{job::Worker, router::lanes_for_worker};
use axum::extract::State;
use axum::Json;

use crate::error::ApiError;
use crate::state::AppState;

async fn queue_depths(state: &AppState) -> Result<QueueDepths, ApiError> {
    let mut depths = Vec::new();
    for worker in [Worker::Machinist, Worker::Archivist] {
        for lane in lanes_for_worker(worker) {
            depths.push((lane, state.queue.lane_depth(lane).await?));
        }
    }

    let get = |worker: Worker, priority: archival_core::jobs::job::Priority| {
        depths
            .iter()
            .find(|(lane, _)| lane.worker == worker && lane.priority == priority)
            .map(|(_, d)| *d)
            .unwrap_or(0)
    };

    use archival_core::jobs::job::Priority;
    Ok(QueueDepths {
        machinist_instant: get(Worker::Machinist, Priority::Instant),
        machinist_standard: get(Worker::Machinist, Priority::Standard),
        archivist_instant: get(Worker::Archivist, Priority::Instant),
        archivist_standard: get(Worker::Archivist, Priority::Standard),
        archivist_jobgroup: get(Worker::Archivist, Priority::Jobgroup),
        dlq_machinist: state.dlq.depth(Worker::Machinist).await?,
        dlq_archivist: state.dlq.depth(Worker::Archivist).await?,
    })
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthSnapshot>, ApiError> {
    let depths = queue_depths(&state).await.ok();
    let snapshot = HealthSnapshot::compute(&state.redis, state.db.as_ref(), depths, None).await;
    Ok(Json(snapshot))
}
