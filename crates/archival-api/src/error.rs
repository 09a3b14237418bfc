//! Wraps `archival_core::Error` in an `IntoResponse` impl so handlers can
//! return `Result<T, ApiError>` directly and get the `{error, message}`
//! JSON body §7 specifies, with the status code `Error::status_code`
//! already maps per category.

use archival_core::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": self.0.category(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
