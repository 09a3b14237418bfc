//! The Machinist pipeline (§4.6): produce derivatives from a single
//! uploaded original under a named `file_purpose` and record them
//! durably. Implements `JobHandler` so a `WorkerLoop` can dispatch
//! directly to it.

use crate::db::asset_version::AssetVersionUpsert;
use crate::db::AssetVersionRepository;
use crate::jobs::job::{FilePurpose, Job, MachinistJob};
use crate::jobs::worker::JobHandler;
use crate::media::{derivative_key, landing_key, preservation_bundle_key, BlobStore, Derivative};
use crate::pipelines::image_ops::{self, ResolutionBounds};
use crate::pipelines::manifest::{build_manifest, ManifestInput};
use crate::pipelines::{exif, working_dir::WorkingDir};
use crate::{Error, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{info, warn};

/// Fallback extension order tried after the job's declared extension.
const FALLBACK_EXTENSIONS: &[&str] = &["tif", "tiff", "jpg", "jpeg", "png"];

/// Hard ceiling on a preservation bundle, per §4.6 step 10.
const MAX_ARCHIVE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Above this, the preservation path refuses the job at entry.
const MAX_INPUT_BYTES: u64 = 120 * 1024 * 1024;

/// Minimum free memory required to accept a job, per §5.
const MIN_FREE_MEMORY_BYTES: u64 = 300 * 1024 * 1024;

pub struct MachinistPipeline {
    blob_store: BlobStore,
    asset_versions: AssetVersionRepository,
    resolution_bounds: ResolutionBounds,
    sharp_timeout: Duration,
}

impl MachinistPipeline {
    pub fn new(
        blob_store: BlobStore,
        asset_versions: AssetVersionRepository,
        resolution_bounds: ResolutionBounds,
        sharp_timeout: Duration,
    ) -> Self {
        Self { blob_store, asset_versions, resolution_bounds, sharp_timeout }
    }

    fn check_memory_guard(&self) -> Result<()> {
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        let free_bytes = system.available_memory();
        if free_bytes < MIN_FREE_MEMORY_BYTES {
            return Err(Error::resource(format!(
                "insufficient free memory to accept job: {} bytes available, {} required",
                free_bytes, MIN_FREE_MEMORY_BYTES
            )));
        }
        Ok(())
    }

    fn candidate_keys(&self, job: &MachinistJob) -> Vec<String> {
        candidate_extensions(&job.input_extension)
            .into_iter()
            .map(|ext| landing_key(job.tenant_id, job.batch_id, job.asset_id, &ext))
            .collect()
    }

    fn bucket_for_purpose(&self, purpose: FilePurpose) -> &str {
        match purpose {
            FilePurpose::Preservation => &self.blob_store.buckets().archive,
            _ => &self.blob_store.buckets().standard,
        }
    }

    async fn upload_derivative(
        &self,
        job: &MachinistJob,
        derivative: Derivative,
        variant: &str,
        data: Vec<u8>,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<()> {
        let key = derivative_key(job.tenant_id, job.batch_id, job.asset_id, derivative);
        let bucket = self.blob_store.buckets().standard.clone();
        let file_size = data.len() as i64;

        let checksum = hex::encode(Sha256::digest(&data));
        self.blob_store.put(&bucket, &key, data, "image/jpeg").await?;

        self.asset_versions
            .upsert(AssetVersionUpsert {
                tenant_id: job.tenant_id,
                asset_id: job.asset_id,
                batch_id: job.batch_id,
                purpose: job.file_purpose.as_str().to_string(),
                variant: variant.to_string(),
                version_type: "derivative".to_string(),
                status: "success".to_string(),
                bucket,
                object_key: key,
                file_size: Some(file_size),
                width: width.map(|w| w as i32),
                height: height.map(|h| h as i32),
                bit_depth: None,
                color_space: None,
                mime_type: Some("image/jpeg".to_string()),
                checksum: Some(checksum),
                checksum_algorithm: Some("sha256".to_string()),
                metadata: serde_json::json!({}),
                failed_reason: None,
            })
            .await?;

        Ok(())
    }

    async fn build_preservation_bundle(&self, job: &MachinistJob, working_dir: &WorkingDir) -> Result<()> {
        let existing = self.asset_versions.find_by_asset(job.asset_id).await?;
        if existing
            .iter()
            .any(|v| v.purpose == "preservation" && v.variant == "bundle" && v.version_type == "preservation")
        {
            info!(asset_id = %job.asset_id, "preservation bundle already recorded, skipping");
            return Ok(());
        }

        let archive_bytes = {
            let dir = working_dir.path().to_path_buf();
            tokio::task::spawn_blocking(move || build_deterministic_tar_gz(&dir))
                .await
                .map_err(|e| Error::storage(format!("preservation bundle task panicked: {}", e)))??
        };

        if archive_bytes.len() as u64 > MAX_ARCHIVE_BYTES {
            return Err(Error::resource(format!(
                "preservation bundle exceeds max archive size: {} bytes",
                archive_bytes.len()
            )));
        }

        let checksum = hex::encode(Sha256::digest(&archive_bytes));
        let key = preservation_bundle_key(job.tenant_id, job.asset_id);
        let bucket = self.blob_store.buckets().archive.clone();
        let file_size = archive_bytes.len() as i64;

        self.blob_store.put(&bucket, &key, archive_bytes, "application/gzip").await?;

        self.asset_versions
            .upsert(AssetVersionUpsert {
                tenant_id: job.tenant_id,
                asset_id: job.asset_id,
                batch_id: job.batch_id,
                purpose: "preservation".to_string(),
                variant: "bundle".to_string(),
                version_type: "preservation".to_string(),
                status: "success".to_string(),
                bucket,
                object_key: key,
                file_size: Some(file_size),
                width: None,
                height: None,
                bit_depth: None,
                color_space: None,
                mime_type: Some("application/gzip".to_string()),
                checksum: Some(checksum),
                checksum_algorithm: Some("sha256".to_string()),
                metadata: serde_json::json!({}),
                failed_reason: None,
            })
            .await?;

        Ok(())
    }
}

fn build_deterministic_tar_gz(dir: &std::path::Path) -> Result<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let gz = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(gz);

    let mut entries: Vec<_> = walk_files(dir)?;
    entries.sort();

    for path in entries {
        let relative = path.strip_prefix(dir).unwrap_or(&path);
        let mut header = tar::Header::new_gnu();
        let metadata = std::fs::metadata(&path).map_err(Error::Io)?;
        header.set_size(metadata.len());
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();

        let data = std::fs::read(&path).map_err(Error::Io)?;
        builder
            .append_data(&mut header, relative, data.as_slice())
            .map_err(Error::Io)?;
    }

    let gz = builder.into_inner().map_err(Error::Io)?;
    gz.finish().map_err(Error::Io)
}

fn walk_files(dir: &std::path::Path) -> Result<Vec<std::path::PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(Error::Io)? {
        let entry = entry.map_err(Error::Io)?;
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk_files(&path)?);
        } else {
            out.push(path);
        }
    }
    Ok(out)
}

#[async_trait::async_trait]
impl JobHandler for MachinistPipeline {
    async fn handle(&self, job: &Job) -> Result<()> {
        let job = match job {
            Job::Machinist(j) => j,
            Job::Archivist(_) => return Err(Error::routing("machinist pipeline received an archivist job")),
        };

        self.check_memory_guard()?;

        let working_dir = WorkingDir::create(job.asset_id)?;

        let result = self.run(job, &working_dir).await;

        if let Err(cleanup_err) = working_dir.remove() {
            warn!(asset_id = %job.asset_id, error = %cleanup_err, "failed to remove working directory");
        }

        result
    }
}

impl MachinistPipeline {
    async fn run(&self, job: &MachinistJob, working_dir: &WorkingDir) -> Result<()> {
        let candidates = self.candidate_keys(job);
        let standard_bucket = self.blob_store.buckets().standard.clone();

        let (_matched_key, original_bytes) = self
            .blob_store
            .get_first_existing(&standard_bucket, &candidates)
            .await?;

        if job.file_purpose == FilePurpose::Preservation && original_bytes.len() as u64 > MAX_INPUT_BYTES {
            return Err(Error::resource(format!(
                "input exceeds maximum size for preservation path: {} bytes",
                original_bytes.len()
            )));
        }

        let format = image_ops::validate_magic_bytes(&original_bytes)?;
        let decoded = image_ops::decode(&original_bytes, format)?;
        let (width, height) = image::GenericImageView::dimensions(&decoded);
        image_ops::enforce_resolution_bounds(width, height, &self.resolution_bounds)?;

        let exif_doc = exif::extract_normalized_exif(&original_bytes);

        let original_key = landing_key(job.tenant_id, job.batch_id, job.asset_id, &job.input_extension);
        let original_bucket = self.bucket_for_purpose(job.file_purpose).to_string();
        self.blob_store
            .put_if_absent(&original_bucket, &original_key, original_bytes.clone(), "application/octet-stream")
            .await?;

        working_dir.write_file("original", &original_bytes)?;

        let checksum = hex::encode(Sha256::digest(&original_bytes));
        self.asset_versions
            .upsert(AssetVersionUpsert {
                tenant_id: job.tenant_id,
                asset_id: job.asset_id,
                batch_id: job.batch_id,
                purpose: job.file_purpose.as_str().to_string(),
                variant: "original".to_string(),
                version_type: "original".to_string(),
                status: "success".to_string(),
                bucket: original_bucket,
                object_key: original_key,
                file_size: Some(original_bytes.len() as i64),
                width: Some(width as i32),
                height: Some(height as i32),
                bit_depth: None,
                color_space: None,
                mime_type: Some(format!("image/{}", job.input_extension)),
                checksum: Some(checksum),
                checksum_algorithm: Some("sha256".to_string()),
                metadata: serde_json::json!({}),
                failed_reason: None,
            })
            .await?;

        let timeout = self.sharp_timeout;
        let viewing_image = decoded.clone();
        match image_ops::guarded(timeout, move || image_ops::render_viewing(&viewing_image, 2000)).await {
            Ok(bytes) => {
                working_dir.write_file("viewing.jpg", &bytes)?;
                self.upload_derivative(job, Derivative::Viewing, "viewing", bytes, None, None).await?;
            }
            Err(e) => warn!(asset_id = %job.asset_id, error = %e, "viewing derivative generation failed"),
        }

        if matches!(job.file_purpose, FilePurpose::Preservation | FilePurpose::Viewing) {
            let ai_image = decoded.clone();
            match image_ops::guarded(timeout, move || image_ops::render_ai_letterbox(&ai_image, 768)).await {
                Ok(bytes) => {
                    working_dir.write_file("ai.jpg", &bytes)?;
                    self.upload_derivative(job, Derivative::Ai, "ai", bytes, Some(768), Some(768)).await?;
                }
                Err(e) => warn!(asset_id = %job.asset_id, error = %e, "ai derivative generation failed"),
            }
        }

        for (derivative, variant, width_target, filename) in [
            (Derivative::ThumbnailSmall, "thumb-small", 200u32, "thumb-small.jpg"),
            (Derivative::ThumbnailMedium, "thumb-medium", 400u32, "thumb-medium.jpg"),
            (Derivative::ThumbnailLarge, "thumb-large", 800u32, "thumb-large.jpg"),
        ] {
            let source = decoded.clone();
            match image_ops::guarded(timeout, move || image_ops::render_thumbnail(&source, width_target)).await {
                Ok(bytes) => {
                    working_dir.write_file(filename, &bytes)?;
                    self.upload_derivative(job, derivative, variant, bytes, None, None).await?;
                }
                Err(e) => warn!(asset_id = %job.asset_id, derivative = variant, error = %e, "thumbnail generation failed"),
            }
        }

        let manifest = build_manifest(ManifestInput {
            tenant_id: job.tenant_id,
            asset_id: job.asset_id,
            batch_id: job.batch_id,
            file_purpose: job.file_purpose.as_str().to_string(),
            input_extension: job.input_extension.clone(),
            exif: exif_doc,
            ai: None,
            generated_at: Utc::now(),
        });
        let manifest_bytes = serde_json::to_vec_pretty(&manifest).map_err(Error::Serialization)?;
        working_dir.write_file("manifest.json", &manifest_bytes)?;

        let manifest_key = derivative_key(job.tenant_id, job.batch_id, job.asset_id, Derivative::Metadata);
        let files_bucket = self.blob_store.buckets().files.clone();
        self.blob_store.put(&files_bucket, &manifest_key, manifest_bytes, "application/json").await?;

        self.asset_versions
            .upsert(AssetVersionUpsert {
                tenant_id: job.tenant_id,
                asset_id: job.asset_id,
                batch_id: job.batch_id,
                purpose: job.file_purpose.as_str().to_string(),
                variant: "manifest".to_string(),
                version_type: "metadata".to_string(),
                status: "success".to_string(),
                bucket: files_bucket,
                object_key: manifest_key,
                file_size: None,
                width: None,
                height: None,
                bit_depth: None,
                color_space: None,
                mime_type: Some("application/json".to_string()),
                checksum: None,
                checksum_algorithm: None,
                metadata: manifest,
                failed_reason: None,
            })
            .await?;

        if job.file_purpose == FilePurpose::Preservation {
            self.build_preservation_bundle(job, working_dir).await?;
        }

        Ok(())
    }
}

/// The declared extension tried first, then the fallback order, with
/// duplicates removed.
pub fn candidate_extensions(declared: &str) -> Vec<String> {
    let mut extensions = vec![declared.to_string()];
    for fallback in FALLBACK_EXTENSIONS {
        if !extensions.iter().any(|e| e == fallback) {
            extensions.push(fallback.to_string());
        }
    }
    extensions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_extensions_tries_declared_first() {
        let extensions = candidate_extensions("png");
        assert_eq!(extensions[0], "png");
        assert!(extensions.contains(&"tif".to_string()));
        assert_eq!(extensions.iter().filter(|e| *e == "png").count(), 1);
    }

    #[test]
    fn test_ai_derivative_only_for_preservation_and_viewing() {
        assert!(matches!(FilePurpose::Preservation, FilePurpose::Preservation | FilePurpose::Viewing));
        assert!(matches!(FilePurpose::Viewing, FilePurpose::Preservation | FilePurpose::Viewing));
        assert!(!matches!(FilePurpose::Production, FilePurpose::Preservation | FilePurpose::Viewing));
    }

}
