//! Repository for `jobgroup_results`: one row per `(jobgroup_id, asset_id)`,
//! upsert-only, used for idempotency short-circuiting on replayed output.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct JobgroupResult {
    pub id: Uuid,
    pub jobgroup_id: Uuid,
    pub asset_id: Uuid,
    pub custom_id: String,
    pub status: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub raw_response: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct JobgroupResultRepository {
    pool: PgPool,
}

impl JobgroupResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn exists(&self, jobgroup_id: Uuid, asset_id: Uuid) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobgroup_results WHERE jobgroup_id = $1 AND asset_id = $2",
        )
        .bind(jobgroup_id)
        .bind(asset_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(count > 0)
    }

    pub async fn count_for_jobgroup(&self, jobgroup_id: Uuid) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobgroup_results WHERE jobgroup_id = $1")
            .bind(jobgroup_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    pub async fn count_failed_for_jobgroup(&self, jobgroup_id: Uuid) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobgroup_results WHERE jobgroup_id = $1 AND status = 'failed'",
        )
        .bind(jobgroup_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        jobgroup_id: Uuid,
        asset_id: Uuid,
        custom_id: &str,
        status: &str,
        error_code: Option<&str>,
        error_message: Option<&str>,
        raw_response: Option<Json>,
    ) -> Result<JobgroupResult> {
        sqlx::query_as::<_, JobgroupResult>(
            r#"
            INSERT INTO jobgroup_results (
                jobgroup_id, asset_id, custom_id, status, error_code,
                error_message, raw_response, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            ON CONFLICT (jobgroup_id, asset_id) DO UPDATE SET
                custom_id = EXCLUDED.custom_id,
                status = EXCLUDED.status,
                error_code = EXCLUDED.error_code,
                error_message = EXCLUDED.error_message,
                raw_response = EXCLUDED.raw_response,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(jobgroup_id)
        .bind(asset_id)
        .bind(custom_id)
        .bind(status)
        .bind(error_code)
        .bind(error_message)
        .bind(raw_response)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }
}
