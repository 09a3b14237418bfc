//! Database access layer: explicit pool construction and the repositories
//! for the four durable tables this service owns.

pub mod ai_description;
pub mod asset_version;
pub mod jobgroup;
pub mod jobgroup_result;
pub mod migrate;

pub use ai_description::AiDescriptionRepository;
pub use asset_version::AssetVersionRepository;
pub use jobgroup::JobgroupRepository;
pub use jobgroup_result::JobgroupResultRepository;
pub use migrate::{DbStatus, Migrator};

use crate::{Error, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// A connected database handle, constructed once at process start and
/// threaded through worker/server bootstraps via dependency injection —
/// never stashed in a global singleton.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connect using `DATABASE_URL`, running migrations before returning.
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self> {
        let pool = create_pool(database_url, pool_size).await?;
        migrate::auto_migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// Open a connection pool against `database_url`.
pub async fn create_pool(database_url: &str, pool_size: u32) -> Result<PgPool> {
    info!("connecting to database (pool_size={})", pool_size);

    PgPoolOptions::new()
        .max_connections(pool_size)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .map_err(Error::Database)
}
