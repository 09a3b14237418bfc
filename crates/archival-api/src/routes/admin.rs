//! `POST /admin/pm2` and `GET /admin/pm2/list` (§4.9): a stub for the
//! process-manager integration the supervising `pm2` instance exposes in
//! production. Process supervision itself is an external collaborator
//! (§1); these handlers only acknowledge the shape of the surface so
//! operator tooling written against it does not 404.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn pm2_command(Json(_body): Json<Value>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({
        "status": "not_implemented",
        "message": "process supervision is managed outside this service",
    })))
}

pub async fn pm2_list(State(_state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({ "processes": [] })))
}
