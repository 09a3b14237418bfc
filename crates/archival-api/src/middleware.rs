//! Bearer-token authentication for the control plane (§4.9).
//!
//! Simplified from the teacher's scoped-API-key/JWT stack down to a
//! constant-time compare against the two env-configured token pools
//! (`AuthTokens::accepts_enqueue`/`accepts_admin`) — there is no
//! customer-facing key system in this domain, only operator tokens.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::state::AppState;

fn extract_bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Gate routes that accept either the operator enqueue token or the
/// worker-to-worker token (`POST /enqueue`).
pub async fn require_enqueue_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    match extract_bearer(&request) {
        Some(token) if state.config.auth.accepts_enqueue(token) => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Gate admin-only routes (queue overview, DLQ browse/requeue/purge).
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    match extract_bearer(&request) {
        Some(token) if state.config.auth.accepts_admin(token) => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archival_core::config::AuthTokens;

    #[test]
    fn test_extract_bearer_strips_prefix() {
        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer secret-token")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_bearer(&request), Some("secret-token"));
    }

    #[test]
    fn test_extract_bearer_rejects_missing_prefix() {
        let request = Request::builder()
            .header(header::AUTHORIZATION, "secret-token")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_bearer(&request), None);
    }

    #[test]
    fn test_auth_tokens_accept_admin() {
        let tokens = AuthTokens {
            admin: Some("admin-token".to_string()),
            enqueue: None,
            worker_enqueue: None,
        };
        assert!(tokens.accepts_admin("admin-token"));
        assert!(!tokens.accepts_admin("wrong"));
    }
}
