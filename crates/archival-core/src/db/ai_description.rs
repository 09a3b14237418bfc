//! Repository for `ai_descriptions`: one row per `(tenant_id, asset_id)`.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct AiDescription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub asset_id: Uuid,
    pub description: Json,
    pub notes: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AiDescriptionRepository {
    pool: PgPool,
}

impl AiDescriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        tenant_id: Uuid,
        asset_id: Uuid,
        description: Json,
        notes: Json,
    ) -> Result<AiDescription> {
        sqlx::query_as::<_, AiDescription>(
            r#"
            INSERT INTO ai_descriptions (tenant_id, asset_id, description, notes, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (tenant_id, asset_id) DO UPDATE SET
                description = EXCLUDED.description,
                notes = EXCLUDED.notes,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(asset_id)
        .bind(description)
        .bind(notes)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn find(&self, tenant_id: Uuid, asset_id: Uuid) -> Result<Option<AiDescription>> {
        sqlx::query_as::<_, AiDescription>(
            "SELECT * FROM ai_descriptions WHERE tenant_id = $1 AND asset_id = $2",
        )
        .bind(tenant_id)
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }
}
