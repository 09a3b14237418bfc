//! S3-backed blob store.
//!
//! Exists-then-skip uploads and plain downloads across the three buckets
//! this service writes into. No local-disk fallback: every derivative and
//! the preservation bundle live in blob storage, matching the Machinist
//! pipeline's idempotency requirements.

use crate::{Error, Result};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info};

/// Bucket labels this service writes into, read from `BLOB_BUCKET_STANDARD`
/// / `BLOB_BUCKET_ARCHIVE` / `BLOB_BUCKET_FILES`.
#[derive(Debug, Clone)]
pub struct Buckets {
    pub standard: String,
    pub archive: String,
    pub files: String,
}

impl Buckets {
    pub fn from_env() -> Self {
        Self {
            standard: std::env::var("BLOB_BUCKET_STANDARD").unwrap_or_else(|_| "archival-standard".to_string()),
            archive: std::env::var("BLOB_BUCKET_ARCHIVE").unwrap_or_else(|_| "archival-archive".to_string()),
            files: std::env::var("BLOB_BUCKET_FILES").unwrap_or_else(|_| "archival-files".to_string()),
        }
    }
}

#[derive(Clone)]
pub struct BlobStore {
    client: S3Client,
    buckets: Buckets,
}

impl BlobStore {
    pub async fn from_env() -> Self {
        let config = aws_config::load_from_env().await;
        let client = S3Client::new(&config);
        Self {
            client,
            buckets: Buckets::from_env(),
        }
    }

    pub fn new(client: S3Client, buckets: Buckets) -> Self {
        Self { client, buckets }
    }

    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }

    /// Whether an object already exists at `key` in `bucket`.
    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(Error::storage(format!("head_object failed for {}/{}: {}", bucket, key, service_err)))
                }
            }
        }
    }

    /// Upload `data` to `key` in `bucket` unless it already exists
    /// (idempotent "exists?-then-skip" semantics). Returns whether an
    /// upload was actually performed.
    pub async fn put_if_absent(&self, bucket: &str, key: &str, data: Vec<u8>, content_type: &str) -> Result<bool> {
        if self.exists(bucket, key).await? {
            debug!("skip upload, already present: {}/{}", bucket, key);
            return Ok(false);
        }

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Error::storage(format!("put_object failed for {}/{}: {}", bucket, key, e)))?;

        info!("uploaded {}/{}", bucket, key);
        Ok(true)
    }

    /// Upload `data` to `key`, always overwriting.
    pub async fn put(&self, bucket: &str, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Error::storage(format!("put_object failed for {}/{}: {}", bucket, key, e)))?;

        Ok(())
    }

    /// Download an object's full body.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::storage(format!("get_object failed for {}/{}: {}", bucket, key, e)))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| Error::storage(format!("failed reading body for {}/{}: {}", bucket, key, e)))?;

        Ok(bytes.into_bytes().to_vec())
    }

    /// Try the first existing key among several candidates, returning its
    /// bytes and the key that matched. Used by the Machinist pipeline's
    /// fallback extension order.
    pub async fn get_first_existing(&self, bucket: &str, candidates: &[String]) -> Result<(String, Vec<u8>)> {
        for key in candidates {
            if self.exists(bucket, key).await? {
                let data = self.get(bucket, key).await?;
                return Ok((key.clone(), data));
            }
        }
        Err(Error::not_found(format!(
            "none of the candidate keys exist in {}: {:?}",
            bucket, candidates
        )))
    }
}
