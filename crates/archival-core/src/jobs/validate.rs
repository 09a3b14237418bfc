//! Field-level validation of raw enqueue payloads, producing a
//! `ValidationErrors` collection rather than bailing on the first bad field
//! (callers that surface HTTP 400s want the whole list at once).

use crate::common::{is_allowed_extension, normalize_extension};
use crate::error::ValidationErrors;
use crate::jobs::job::{ArchivistJob, FilePurpose, Job, MachinistJob, Priority, Worker};
use serde_json::Value;
use uuid::Uuid;

/// Identifiers are UUIDv4 per §3/§4.3 — `Uuid::parse_str` alone accepts any
/// version, so the version byte is checked separately.
fn parse_uuid_v4(s: &str) -> Option<Uuid> {
    let id = Uuid::parse_str(s).ok()?;
    if id.get_version_num() == 4 {
        Some(id)
    } else {
        None
    }
}

fn parse_uuid(value: &Value, field: &str, errors: &mut ValidationErrors) -> Option<Uuid> {
    match value.as_str() {
        Some(s) => match parse_uuid_v4(s) {
            Some(id) => Some(id),
            None => {
                errors.add_with_code(field, format!("{} is not a valid v4 UUID", field), "invalid_uuid");
                None
            }
        },
        None => {
            errors.add_with_code(field, format!("{} is required", field), "missing_field");
            None
        }
    }
}

fn parse_optional_uuid(value: &Value, field: &str, errors: &mut ValidationErrors) -> Option<Uuid> {
    match value.get(field) {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_str() {
            Some(s) => match parse_uuid_v4(s) {
                Some(id) => Some(id),
                None => {
                    errors.add_with_code(field, format!("{} is not a valid v4 UUID", field), "invalid_uuid");
                    None
                }
            },
            None => {
                errors.add_with_code(field, format!("{} must be a string", field), "invalid_type");
                None
            }
        },
    }
}

/// Validate a raw enqueue body and produce a typed `Job`, or the full set
/// of field errors. `job_type` must already have resolved to a `Worker`
/// before this is called — that dispatch lives in `jobs::router`.
pub fn validate_job(worker: Worker, body: &Value) -> Result<Job, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let tenant_id = body
        .get("tenant_id")
        .map(|v| parse_uuid(v, "tenant_id", &mut errors))
        .unwrap_or_else(|| {
            errors.add_with_code("tenant_id", "tenant_id is required", "missing_field");
            None
        });
    let asset_id = body
        .get("asset_id")
        .map(|v| parse_uuid(v, "asset_id", &mut errors))
        .unwrap_or_else(|| {
            errors.add_with_code("asset_id", "asset_id is required", "missing_field");
            None
        });
    let batch_id = parse_optional_uuid(body, "batch_id", &mut errors);

    let job = match worker {
        Worker::Machinist => {
            let file_purpose = match body.get("file_purpose").and_then(Value::as_str) {
                Some(raw) => match FilePurpose::from_str(raw) {
                    Some(fp) => Some(fp),
                    None => {
                        errors.add_with_code(
                            "file_purpose",
                            format!("unrecognized file_purpose '{}'", raw),
                            "invalid_enum",
                        );
                        None
                    }
                },
                None => {
                    errors.add_with_code("file_purpose", "file_purpose is required", "missing_field");
                    None
                }
            };

            let input_extension = match body.get("input_extension").and_then(Value::as_str) {
                Some(raw) => {
                    let normalized = normalize_extension(raw);
                    if is_allowed_extension(&normalized) {
                        Some(normalized)
                    } else {
                        errors.add_with_code(
                            "input_extension",
                            format!("extension '{}' is not supported", normalized),
                            "unsupported_extension",
                        );
                        None
                    }
                }
                None => {
                    errors.add_with_code("input_extension", "input_extension is required", "missing_field");
                    None
                }
            };

            let priority = Priority::from_processing_type(body.get("processing_type").and_then(Value::as_str));
            if priority == Priority::Jobgroup {
                errors.add_with_code(
                    "processing_type",
                    "machinist jobs cannot be routed to the jobgroup lane",
                    "invalid_combination",
                );
            }

            match (tenant_id, asset_id, file_purpose, input_extension) {
                (Some(tenant_id), Some(asset_id), Some(file_purpose), Some(input_extension)) => {
                    Some(Job::Machinist(MachinistJob {
                        tenant_id,
                        asset_id,
                        batch_id,
                        file_purpose,
                        input_extension,
                        priority,
                    }))
                }
                _ => None,
            }
        }
        Worker::Archivist => {
            let processing_type = Priority::from_processing_type(body.get("processing_type").and_then(Value::as_str));

            match (tenant_id, asset_id) {
                (Some(tenant_id), Some(asset_id)) => Some(Job::Archivist(ArchivistJob {
                    tenant_id,
                    asset_id,
                    batch_id,
                    processing_type,
                })),
                _ => None,
            }
        }
    };

    match job {
        Some(job) if errors.is_empty() => Ok(job),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_machinist_job() {
        let body = json!({
            "tenant_id": "11111111-1111-4111-8111-111111111111",
            "asset_id": "22222222-2222-4222-8222-222222222222",
            "file_purpose": "viewing",
            "input_extension": ".JPG",
            "processing_type": "instant",
        });
        let job = validate_job(Worker::Machinist, &body).unwrap();
        match job {
            Job::Machinist(j) => {
                assert_eq!(j.input_extension, "jpg");
                assert_eq!(j.priority, Priority::Instant);
            }
            _ => panic!("expected machinist job"),
        }
    }

    #[test]
    fn test_rejects_unsupported_extension() {
        let body = json!({
            "tenant_id": "11111111-1111-4111-8111-111111111111",
            "asset_id": "22222222-2222-4222-8222-222222222222",
            "file_purpose": "viewing",
            "input_extension": "heic",
        });
        let err = validate_job(Worker::Machinist, &body).unwrap_err();
        assert!(err.errors.iter().any(|e| e.field == "input_extension"));
    }

    #[test]
    fn test_rejects_missing_asset_id() {
        let body = json!({
            "tenant_id": "11111111-1111-4111-8111-111111111111",
        });
        let err = validate_job(Worker::Archivist, &body).unwrap_err();
        assert!(err.errors.iter().any(|e| e.field == "asset_id"));
    }

    #[test]
    fn test_rejects_machinist_jobgroup_combination() {
        let body = json!({
            "tenant_id": "11111111-1111-4111-8111-111111111111",
            "asset_id": "22222222-2222-4222-8222-222222222222",
            "file_purpose": "viewing",
            "input_extension": "jpg",
            "processing_type": "jobgroup",
        });
        let err = validate_job(Worker::Machinist, &body).unwrap_err();
        assert!(err.errors.iter().any(|e| e.field == "processing_type"));
    }

    #[test]
    fn test_archivist_batch_synonym_normalizes_to_jobgroup() {
        let body = json!({
            "tenant_id": "11111111-1111-4111-8111-111111111111",
            "asset_id": "22222222-2222-4222-8222-222222222222",
            "processing_type": "batch",
        });
        let job = validate_job(Worker::Archivist, &body).unwrap();
        match job {
            Job::Archivist(j) => assert_eq!(j.processing_type, Priority::Jobgroup),
            _ => panic!("expected archivist job"),
        }
    }

    #[test]
    fn test_rejects_non_v4_tenant_id() {
        let body = json!({
            "tenant_id": "11111111-1111-1111-8111-111111111111",
            "asset_id": "22222222-2222-4222-8222-222222222222",
        });
        let err = validate_job(Worker::Archivist, &body).unwrap_err();
        assert!(err.errors.iter().any(|e| e.field == "tenant_id"));
    }

    #[test]
    fn test_rejects_malformed_batch_id() {
        let body = json!({
            "tenant_id": "11111111-1111-4111-8111-111111111111",
            "asset_id": "22222222-2222-4222-8222-222222222222",
            "batch_id": "not-a-uuid",
        });
        let err = validate_job(Worker::Archivist, &body).unwrap_err();
        assert!(err.errors.iter().any(|e| e.field == "batch_id"));
    }
}
