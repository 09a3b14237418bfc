//! Repository for `asset_versions`: one row per
//! `(asset_id, purpose, variant, version_type)`, upserted idempotently.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct AssetVersion {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub asset_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub purpose: String,
    pub variant: String,
    pub version_type: String,
    pub status: String,
    pub bucket: String,
    pub object_key: String,
    pub file_size: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub bit_depth: Option<i32>,
    pub color_space: Option<String>,
    pub mime_type: Option<String>,
    pub checksum: Option<String>,
    pub checksum_algorithm: Option<String>,
    pub metadata: Json,
    pub failed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted by an upsert. Not every derivative carries every field
/// (e.g. a preservation bundle has no width/height).
#[derive(Debug, Clone)]
pub struct AssetVersionUpsert {
    pub tenant_id: Uuid,
    pub asset_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub purpose: String,
    pub variant: String,
    pub version_type: String,
    pub status: String,
    pub bucket: String,
    pub object_key: String,
    pub file_size: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub bit_depth: Option<i32>,
    pub color_space: Option<String>,
    pub mime_type: Option<String>,
    pub checksum: Option<String>,
    pub checksum_algorithm: Option<String>,
    pub metadata: Json,
    pub failed_reason: Option<String>,
}

#[derive(Clone)]
pub struct AssetVersionRepository {
    pool: PgPool,
}

impl AssetVersionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert on `(asset_id, purpose, variant, version_type)`.
    pub async fn upsert(&self, row: AssetVersionUpsert) -> Result<AssetVersion> {
        sqlx::query_as::<_, AssetVersion>(
            r#"
            INSERT INTO asset_versions (
                tenant_id, asset_id, batch_id, purpose, variant, version_type,
                status, bucket, object_key, file_size, width, height, bit_depth,
                color_space, mime_type, checksum, checksum_algorithm, metadata,
                failed_reason, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, now()
            )
            ON CONFLICT (asset_id, purpose, variant, version_type) DO UPDATE SET
                tenant_id = EXCLUDED.tenant_id,
                batch_id = EXCLUDED.batch_id,
                status = EXCLUDED.status,
                bucket = EXCLUDED.bucket,
                object_key = EXCLUDED.object_key,
                file_size = EXCLUDED.file_size,
                width = EXCLUDED.width,
                height = EXCLUDED.height,
                bit_depth = EXCLUDED.bit_depth,
                color_space = EXCLUDED.color_space,
                mime_type = EXCLUDED.mime_type,
                checksum = EXCLUDED.checksum,
                checksum_algorithm = EXCLUDED.checksum_algorithm,
                metadata = EXCLUDED.metadata,
                failed_reason = EXCLUDED.failed_reason,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(row.tenant_id)
        .bind(row.asset_id)
        .bind(row.batch_id)
        .bind(row.purpose)
        .bind(row.variant)
        .bind(row.version_type)
        .bind(row.status)
        .bind(row.bucket)
        .bind(row.object_key)
        .bind(row.file_size)
        .bind(row.width)
        .bind(row.height)
        .bind(row.bit_depth)
        .bind(row.color_space)
        .bind(row.mime_type)
        .bind(row.checksum)
        .bind(row.checksum_algorithm)
        .bind(row.metadata)
        .bind(row.failed_reason)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Best-effort: record a failure reason on an asset version row without
    /// clobbering other fields. Never returns an error to the caller's
    /// retry/DLQ path — failures here are logged by the caller, not raised.
    pub async fn mark_failed(
        &self,
        asset_id: Uuid,
        purpose: &str,
        variant: &str,
        version_type: &str,
        reason: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE asset_versions
            SET status = 'failed', failed_reason = $5, updated_at = now()
            WHERE asset_id = $1 AND purpose = $2 AND variant = $3 AND version_type = $4
            "#,
        )
        .bind(asset_id)
        .bind(purpose)
        .bind(variant)
        .bind(version_type)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    pub async fn find_by_asset(&self, asset_id: Uuid) -> Result<Vec<AssetVersion>> {
        sqlx::query_as::<_, AssetVersion>(
            "SELECT * FROM asset_versions WHERE asset_id = $1 ORDER BY created_at",
        )
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Recover `tenant_id`/`batch_id` for an asset, used by jobgroup result
    /// processing which only has the asset id from `custom_id`.
    pub async fn tenant_and_batch_for_asset(&self, asset_id: Uuid) -> Result<Option<(Uuid, Option<Uuid>)>> {
        let row: Option<(Uuid, Option<Uuid>)> = sqlx::query_as(
            "SELECT tenant_id, batch_id FROM asset_versions WHERE asset_id = $1 LIMIT 1",
        )
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row)
    }
}
