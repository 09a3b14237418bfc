//! Accumulation buffer for individual archivist jobs whose priority
//! resolved to `jobgroup`. The worker loop never calls the external batch
//! endpoint one job at a time; instead each job is appended here, and an
//! operator (via the `jobgroup create` CLI command) or a scheduled task
//! drains a tenant's buffer into a single `runJobgroup` submission.

use crate::cache::connection::RedisPool;
use crate::jobs::job::ArchivistJob;
use crate::pipelines::archivist::JobgroupDelegate;
use crate::{Error, Result};
use async_trait::async_trait;
use uuid::Uuid;

fn pending_key(tenant_id: Uuid) -> String {
    format!("jobgroup:pending:{}", tenant_id)
}

#[derive(Clone)]
pub struct PendingJobgroupBuffer {
    redis: RedisPool,
}

impl PendingJobgroupBuffer {
    pub fn new(redis: RedisPool) -> Self {
        Self { redis }
    }

    pub async fn push(&self, job: &ArchivistJob) -> Result<()> {
        let payload = serde_json::to_vec(job).map_err(Error::Serialization)?;
        let mut conn = self.redis.get().await?;
        conn.rpush(&pending_key(job.tenant_id), &payload).await?;
        Ok(())
    }

    /// Remove and return every pending job for a tenant, for folding into a
    /// new batch submission.
    pub async fn drain(&self, tenant_id: Uuid) -> Result<Vec<ArchivistJob>> {
        let key = pending_key(tenant_id);
        let mut conn = self.redis.get().await?;
        let raw = conn.lrange(&key, 0, -1).await?;

        let jobs = raw
            .iter()
            .filter_map(|bytes| serde_json::from_slice::<ArchivistJob>(bytes).ok())
            .collect();

        conn.del(&key).await?;
        Ok(jobs)
    }

    pub async fn count(&self, tenant_id: Uuid) -> Result<i64> {
        let mut conn = self.redis.get().await?;
        Ok(conn.llen(&pending_key(tenant_id)).await?)
    }
}

#[async_trait]
impl JobgroupDelegate for PendingJobgroupBuffer {
    async fn accept_pending(&self, job: &ArchivistJob) -> Result<()> {
        self.push(job).await
    }
}
