//! Control-plane bootstrap (§4.9): wires `Config::from_env` into a
//! `RedisPool`, an optional `Database` (absent only in `MINIMAL_MODE`/
//! `DRY_RUN`), a `JobQueue`, a `DeadLetterQueue` and a `JobMetrics`, then
//! serves the axum router built from `routes::router` on `HEALTH_PORT`.
//!
//! There is no TLS/Let's Encrypt layer here — this process sits behind an
//! operator-managed load balancer or service mesh, unlike the
//! public-facing storefront this crate started from.

use std::net::SocketAddr;
use std::sync::Arc;

use archival_core::cache::RedisConfig;
use archival_core::jobs::dead_letter::DeadLetterQueue;
use archival_core::jobs::metrics::JobMetrics;
use archival_core::jobs::queue::JobQueue;
use archival_core::{Config, Database, RedisPool, Result};
use tracing::info;

use crate::routes;
use crate::state::AppState;

pub async fn run(config: Config) -> Result<()> {
    let health_port = config.health_port;

    let redis_config = RedisConfig {
        url: config.redis.connection_string(),
        use_tls: config.redis.tls,
        password: config.redis.password.clone(),
        ..RedisConfig::default()
    };
    let redis = RedisPool::new(redis_config).await?;

    let db = match &config.database_url {
        Some(url) => Some(Database::connect(url, 10).await?),
        None => {
            info!("starting without a database connection (minimal_mode or dry_run)");
            None
        }
    };

    let queue = JobQueue::new(redis.clone());
    let dlq = DeadLetterQueue::new(redis.clone()).with_webhook(config.dlq_webhook_url.clone());
    let metrics = JobMetrics::new();

    let state = AppState::new(Arc::new(config), redis, db, queue, dlq, metrics);
    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], health_port));
    info!("archival-api listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
