//! Repository for `jobgroups`. Status transitions are monotone: once a
//! jobgroup reaches `completed`, `failed`, `expired`, or `cancelled` it
//! never regresses.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobgroupStatus {
    Created,
    Validating,
    InProgress,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl JobgroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobgroupStatus::Created => "created",
            JobgroupStatus::Validating => "validating",
            JobgroupStatus::InProgress => "in_progress",
            JobgroupStatus::Completed => "completed",
            JobgroupStatus::Failed => "failed",
            JobgroupStatus::Expired => "expired",
            JobgroupStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobgroupStatus::Completed | JobgroupStatus::Failed | JobgroupStatus::Expired | JobgroupStatus::Cancelled
        )
    }

    pub fn polling_eligible_statuses() -> [&'static str; 3] {
        ["created", "in_progress", "validating"]
    }
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct Jobgroup {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub external_jobgroup_id: String,
    pub input_file_id: String,
    pub output_file_id: Option<String>,
    pub status: String,
    pub request_count: i32,
    pub notes: Json,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct JobgroupRepository {
    pool: PgPool,
}

impl JobgroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        batch_id: Option<Uuid>,
        external_jobgroup_id: &str,
        input_file_id: &str,
        status: JobgroupStatus,
        request_count: i32,
        notes: Json,
    ) -> Result<Jobgroup> {
        sqlx::query_as::<_, Jobgroup>(
            r#"
            INSERT INTO jobgroups (
                tenant_id, batch_id, external_jobgroup_id, input_file_id,
                status, request_count, notes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(batch_id)
        .bind(external_jobgroup_id)
        .bind(input_file_id)
        .bind(status.as_str())
        .bind(request_count)
        .bind(notes)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Jobgroup>> {
        sqlx::query_as::<_, Jobgroup>("SELECT * FROM jobgroups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    pub async fn list(&self) -> Result<Vec<Jobgroup>> {
        sqlx::query_as::<_, Jobgroup>("SELECT * FROM jobgroups ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    /// Jobgroups eligible for a poll cycle: `{created, in_progress, validating}`.
    pub async fn list_pollable(&self) -> Result<Vec<Jobgroup>> {
        sqlx::query_as::<_, Jobgroup>(
            "SELECT * FROM jobgroups WHERE status = ANY($1) ORDER BY created_at",
        )
        .bind(&JobgroupStatus::polling_eligible_statuses()[..])
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Count jobgroups created by a tenant within the last 24 hours, for the
    /// rate-limit throttle.
    pub async fn count_recent_for_tenant(&self, tenant_id: Uuid) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobgroups WHERE tenant_id = $1 AND created_at > now() - INTERVAL '24 hours'",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Whether the tenant already has an active (non-terminal) jobgroup.
    pub async fn has_active_for_tenant(&self, tenant_id: Uuid) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobgroups WHERE tenant_id = $1 AND status NOT IN ('completed','failed','expired','cancelled')",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(count > 0)
    }

    pub async fn set_output_file(&self, id: Uuid, output_file_id: &str) -> Result<()> {
        sqlx::query("UPDATE jobgroups SET output_file_id = $2 WHERE id = $1")
            .bind(id)
            .bind(output_file_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Transition status, refusing to move a terminal jobgroup backwards.
    pub async fn transition(&self, id: Uuid, status: JobgroupStatus, notes: Option<Json>) -> Result<()> {
        let current = self.find(id).await?;
        if let Some(existing) = &current {
            let was_terminal = JobgroupStatus::polling_eligible_statuses()
                .iter()
                .all(|s| *s != existing.status);
            if was_terminal {
                return Ok(());
            }
        }

        match status {
            JobgroupStatus::Completed => {
                sqlx::query(
                    "UPDATE jobgroups SET status = $2, completed_at = now(), notes = COALESCE($3, notes) WHERE id = $1",
                )
                .bind(id)
                .bind(status.as_str())
                .bind(notes)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
            }
            JobgroupStatus::Failed | JobgroupStatus::Expired => {
                sqlx::query(
                    "UPDATE jobgroups SET status = $2, failed_at = now(), notes = COALESCE($3, notes) WHERE id = $1",
                )
                .bind(id)
                .bind(status.as_str())
                .bind(notes)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
            }
            _ => {
                sqlx::query("UPDATE jobgroups SET status = $2, notes = COALESCE($3, notes) WHERE id = $1")
                    .bind(id)
                    .bind(status.as_str())
                    .bind(notes)
                    .execute(&self.pool)
                    .await
                    .map_err(Error::Database)?;
            }
        }

        Ok(())
    }
}
