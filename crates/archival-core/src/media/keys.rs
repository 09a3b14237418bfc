//! Blob key conventions. Bit-exact per the external interface contract;
//! components here are always UUID strings.

use uuid::Uuid;

/// Named derivative kinds that live under a standard key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivative {
    Preservation,
    Viewing,
    Production,
    Restoration,
    Ai,
    ThumbnailSmall,
    ThumbnailMedium,
    ThumbnailLarge,
    Metadata,
}

impl Derivative {
    fn dir(&self) -> &'static str {
        match self {
            Derivative::Preservation => "preservation",
            Derivative::Viewing => "viewing",
            Derivative::Production => "production",
            Derivative::Restoration => "restoration",
            Derivative::Ai => "ai",
            Derivative::ThumbnailSmall | Derivative::ThumbnailMedium | Derivative::ThumbnailLarge => "thumbnails",
            Derivative::Metadata => "metadata",
        }
    }

    fn filename(&self) -> &'static str {
        match self {
            Derivative::Preservation => "preservation.tif",
            Derivative::Viewing => "viewing.jpg",
            Derivative::Production => "production.jpg",
            Derivative::Restoration => "restoration.jpg",
            Derivative::Ai => "ai.jpg",
            Derivative::ThumbnailSmall => "thumb-small.jpg",
            Derivative::ThumbnailMedium => "thumb-medium.jpg",
            Derivative::ThumbnailLarge => "thumb-large.jpg",
            Derivative::Metadata => "manifest.json",
        }
    }
}

/// Landing key for the uploaded original: `tenant-<tenant>/batch-<batch>/asset-<asset>/original.<ext>`.
/// `batch_id` is optional; when absent the `batch-<batch>` segment is omitted.
pub fn landing_key(tenant_id: Uuid, batch_id: Option<Uuid>, asset_id: Uuid, ext: &str) -> String {
    match batch_id {
        Some(batch_id) => format!(
            "tenant-{}/batch-{}/asset-{}/original.{}",
            tenant_id, batch_id, asset_id, ext
        ),
        None => format!("tenant-{}/asset-{}/original.{}", tenant_id, asset_id, ext),
    }
}

/// Standard derivative key under the asset's prefix.
pub fn derivative_key(tenant_id: Uuid, batch_id: Option<Uuid>, asset_id: Uuid, derivative: Derivative) -> String {
    match batch_id {
        Some(batch_id) => format!(
            "tenant-{}/batch-{}/asset-{}/{}/{}",
            tenant_id,
            batch_id,
            asset_id,
            derivative.dir(),
            derivative.filename()
        ),
        None => format!(
            "tenant-{}/asset-{}/{}/{}",
            tenant_id,
            asset_id,
            derivative.dir(),
            derivative.filename()
        ),
    }
}

/// Preservation bundle key, always under the `archive/` prefix regardless of batch.
pub fn preservation_bundle_key(tenant_id: Uuid, asset_id: Uuid) -> String {
    format!(
        "archive/tenant-{}/asset-{}/preservation/preservation.tar.gz",
        tenant_id, asset_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landing_key_with_batch() {
        let tenant = Uuid::nil();
        let asset = Uuid::nil();
        let batch = Uuid::nil();
        assert_eq!(
            landing_key(tenant, Some(batch), asset, "jpg"),
            format!(
                "tenant-{}/batch-{}/asset-{}/original.jpg",
                tenant, batch, asset
            )
        );
    }

    #[test]
    fn test_derivative_key_thumbnail() {
        let tenant = Uuid::nil();
        let asset = Uuid::nil();
        let key = derivative_key(tenant, None, asset, Derivative::ThumbnailSmall);
        assert!(key.ends_with("thumbnails/thumb-small.jpg"));
    }

    #[test]
    fn test_preservation_bundle_key() {
        let tenant = Uuid::nil();
        let asset = Uuid::nil();
        let key = preservation_bundle_key(tenant, asset);
        assert!(key.starts_with("archive/tenant-"));
        assert!(key.ends_with("preservation/preservation.tar.gz"));
    }
}
