//! `POST /enqueue` (§4.9, auth): the control plane's own producer path.
//! Defaults `job_type` to `machinist`, normalizes the deprecated
//! `processing_type: batch` synonym, rejects the Machinist+jobgroup
//! combination with the literal `unsupported_priority` code the test
//! scenarios name, resolves the destination queue, and pushes.

use archival_core::jobs::{job::Priority, resolve_worker, validate_job, Worker};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(json!({"error": code, "message": message.into()}))).into_response()
}

pub async fn enqueue(State(state): State<AppState>, Json(mut body): Json<Value>) -> Response {
    if !body.get("job_type").map(Value::is_string).unwrap_or(false) {
        body["job_type"] = json!("machinist");
    }

    if body.get("processing_type").and_then(Value::as_str) == Some("batch") {
        body["processing_type"] = json!("jobgroup");
    }

    let job_type = body.get("job_type").and_then(Value::as_str).unwrap_or("machinist");
    let worker = match resolve_worker(job_type) {
        Ok(worker) => worker,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let priority = Priority::from_processing_type(body.get("processing_type").and_then(Value::as_str));
    if worker == Worker::Machinist && priority == Priority::Jobgroup {
        return error_response(
            StatusCode::BAD_REQUEST,
            "unsupported_priority",
            "machinist jobs cannot be routed to the jobgroup lane",
        );
    }

    let job = match validate_job(worker, &body) {
        Ok(job) => job,
        Err(errors) => return ApiError::from(errors.into_error()).into_response(),
    };

    if let Err(e) = state.queue.enqueue(&job).await {
        return ApiError::from(e).into_response();
    }

    (
        StatusCode::CREATED,
        Json(json!({
            "status": "enqueued",
            "worker": job.worker(),
            "priority": job.priority(),
            "tenant_id": job.tenant_id(),
            "asset_id": job.asset_id(),
        })),
    )
        .into_response()
}
