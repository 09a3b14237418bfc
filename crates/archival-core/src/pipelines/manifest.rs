//! Deterministic `manifest.json` assembly (§4.6 step 9).
//!
//! Key order must be stable across runs so re-processing the same asset
//! produces byte-identical manifests; `serde_json`'s default `Map` is a
//! `BTreeMap` in this crate's configuration (the `preserve_order` feature
//! is not enabled anywhere in the workspace), which already sorts keys
//! lexicographically — this module exists to fix the *shape*, not to add
//! sorting of its own.

use chrono::{DateTime, Utc};
use serde_json::{json, Value as Json};
use uuid::Uuid;

pub struct ManifestInput {
    pub tenant_id: Uuid,
    pub asset_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub file_purpose: String,
    pub input_extension: String,
    pub exif: Json,
    pub ai: Option<Json>,
    pub generated_at: DateTime<Utc>,
}

/// Merge EXIF, optional AI block, and system fields into the manifest
/// document. Nulls are never introduced: `batch_id`/`ai` are simply
/// omitted when absent, rather than serialized as `null`.
pub fn build_manifest(input: ManifestInput) -> Json {
    let mut system = serde_json::Map::new();
    system.insert("tenant_id".to_string(), json!(input.tenant_id));
    system.insert("asset_id".to_string(), json!(input.asset_id));
    if let Some(batch_id) = input.batch_id {
        system.insert("batch_id".to_string(), json!(batch_id));
    }
    system.insert("file_purpose".to_string(), json!(input.file_purpose));
    system.insert("input_extension".to_string(), json!(input.input_extension));
    system.insert("generated_at".to_string(), json!(input.generated_at.to_rfc3339()));

    let mut manifest = serde_json::Map::new();
    manifest.insert("exif".to_string(), input.exif);
    if let Some(ai) = input.ai {
        manifest.insert("ai".to_string(), ai);
    }
    manifest.insert("system".to_string(), Json::Object(system));

    Json::Object(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_manifest_omits_absent_batch_id() {
        let manifest = build_manifest(ManifestInput {
            tenant_id: Uuid::nil(),
            asset_id: Uuid::nil(),
            batch_id: None,
            file_purpose: "viewing".to_string(),
            input_extension: "jpg".to_string(),
            exif: json!({}),
            ai: None,
            generated_at: Utc::now(),
        });

        let system = manifest.get("system").unwrap();
        assert!(system.get("batch_id").is_none());
        assert!(manifest.get("ai").is_none());
    }

    #[test]
    fn test_build_manifest_includes_ai_block_when_present() {
        let manifest = build_manifest(ManifestInput {
            tenant_id: Uuid::nil(),
            asset_id: Uuid::nil(),
            batch_id: Some(Uuid::nil()),
            file_purpose: "preservation".to_string(),
            input_extension: "tif".to_string(),
            exif: json!({}),
            ai: Some(json!({"tags": ["a"]})),
            generated_at: Utc::now(),
        });

        assert_eq!(manifest["ai"]["tags"][0], "a");
        assert_eq!(manifest["system"]["batch_id"], Uuid::nil().to_string());
    }
}
