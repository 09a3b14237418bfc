//! Shared identifier/filename validation used by the job validators and
//! the media pipelines.

pub use crate::traits::*;

/// Extension allow-list accepted on Machinist's `input_extension` field,
/// after lowercasing and leading-dot stripping.
pub const EXTENSION_ALLOW_LIST: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

/// MIME types a decoded original is allowed to resolve to.
pub const MIME_ALLOW_LIST: &[&str] = &["image/jpeg", "image/png", "image/tiff"];

/// Normalize an `input_extension` value: lowercase and strip a single
/// leading dot if present.
pub fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.strip_prefix('.').unwrap_or(raw);
    trimmed.to_ascii_lowercase()
}

/// Whether a normalized extension is in the allow-list.
pub fn is_allowed_extension(normalized: &str) -> bool {
    EXTENSION_ALLOW_LIST.contains(&normalized)
}

/// Whether a decoded MIME type is in the allow-list.
pub fn is_allowed_mime(mime: &str) -> bool {
    MIME_ALLOW_LIST.contains(&mime)
}

/// Regular expressions for identifier/filename validation
pub mod regex {
    use lazy_static::lazy_static;
    use regex::Regex;

    lazy_static! {
        /// UUID pattern (used to pre-screen before attempting a parse)
        pub static ref UUID_PATTERN: Regex = Regex::new(
            r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
        ).unwrap();

        /// Safe filename component: letters, digits, underscore, dot, hyphen only
        pub static ref SAFE_FILENAME_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap();

        /// Control characters that must never appear in a filename
        pub static ref CONTROL_CHAR_PATTERN: Regex = Regex::new(r"[\x00-\x1f\x7f]").unwrap();
    }
}

/// Sanitize a filename or extension component per the rule: strip control
/// characters, then reject `..`, `/`, `\`, or anything outside
/// `[A-Za-z0-9_.-]`.
pub fn sanitize_filename_component(raw: &str) -> Result<String, String> {
    if regex::CONTROL_CHAR_PATTERN.is_match(raw) {
        return Err("filename contains control characters".to_string());
    }
    if raw.contains("..") || raw.contains('/') || raw.contains('\\') {
        return Err("filename contains a path traversal sequence".to_string());
    }
    if !regex::SAFE_FILENAME_PATTERN.is_match(raw) {
        return Err("filename contains disallowed characters".to_string());
    }
    Ok(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(".JPG"), "jpg");
        assert_eq!(normalize_extension("PNG"), "png");
        assert_eq!(normalize_extension("tiff"), "tiff");
    }

    #[test]
    fn test_is_allowed_extension() {
        assert!(is_allowed_extension("jpg"));
        assert!(is_allowed_extension("tiff"));
        assert!(!is_allowed_extension("heic"));
        assert!(!is_allowed_extension("gif"));
    }

    #[test]
    fn test_sanitize_filename_component_rejects_traversal() {
        assert!(sanitize_filename_component("../etc/passwd").is_err());
        assert!(sanitize_filename_component("a/b").is_err());
        assert!(sanitize_filename_component("a\\b").is_err());
    }

    #[test]
    fn test_sanitize_filename_component_accepts_safe_names() {
        assert_eq!(
            sanitize_filename_component("viewing.jpg").unwrap(),
            "viewing.jpg"
        );
        assert_eq!(
            sanitize_filename_component("thumb-small.jpg").unwrap(),
            "thumb-small.jpg"
        );
    }

    #[test]
    fn test_uuid_pattern() {
        assert!(regex::UUID_PATTERN.is_match("11111111-1111-4111-8111-111111111111"));
        assert!(!regex::UUID_PATTERN.is_match("not-a-uuid"));
    }
}
