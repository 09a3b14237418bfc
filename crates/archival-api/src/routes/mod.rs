//! Route tree for the control plane (§4.9).

mod admin;
mod enqueue;
mod health;
mod metrics;
mod queues;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{require_admin_token, require_enqueue_token};
use crate::state::AppState;

/// Builds the full axum router: `/health` is unauthenticated (it exists so
/// load balancers and orchestrators can probe liveness without a token),
/// `/enqueue` requires an enqueue-scoped token, and `/metrics` and
/// `/queues/*` require the admin token.
pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/metrics", get(metrics::metrics))
        .route("/queues/overview", get(queues::overview))
        .route("/queues/dlq", get(queues::dlq_range).delete(queues::dlq_purge))
        .route("/queues/dlq/requeue", post(queues::dlq_requeue))
        .route("/admin/pm2", post(admin::pm2_command))
        .route("/admin/pm2/list", get(admin::pm2_list))
        .route_layer(from_fn_with_state(state.clone(), require_admin_token));

    let enqueue_routes = Router::new()
        .route("/enqueue", post(enqueue::enqueue))
        .route_layer(from_fn_with_state(state.clone(), require_enqueue_token));

    Router::new()
        .route("/health", get(health::health))
        .merge(enqueue_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
