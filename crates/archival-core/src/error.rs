use std::fmt;
use serde::{Deserialize, Serialize};

/// Crate-wide error type
#[derive(Debug)]
pub enum Error {
    /// Configuration errors
    Config(String),

    /// Database errors (SQLx wrapped)
    Database(sqlx::Error),

    /// HTTP/network errors talking to an external collaborator
    Network(String),

    /// Authentication/authorization errors on the control plane
    Unauthorized(String),

    /// Malformed job payload, identifiers, or enumerated fields
    Validation(String),

    /// Entity not found
    NotFound(String),

    /// Magic-byte or MIME mismatch against the extension allow-list
    UnsupportedMedia(String),

    /// Resource guard tripped (dimensions, byte size, memory)
    Resource(String),

    /// A guarded operation exceeded its time budget
    Timeout(String),

    /// Blob or relational store errors
    Storage(String),

    /// Redis/queue-layer errors
    Cache(String),

    /// Model or batch API failure
    ExternalApi(String),

    /// Priority router could not resolve a destination queue
    Routing(String),

    /// Non-encodable job payload
    Serialization(serde_json::Error),

    /// IO errors
    Io(std::io::Error),

    /// Generic errors with description
    Other(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Database(e) => write!(f, "Database error: {}", e),
            Error::Network(msg) => write!(f, "Network error: {}", msg),
            Error::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Error::Validation(msg) => write!(f, "Validation error: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::UnsupportedMedia(msg) => write!(f, "Unsupported media: {}", msg),
            Error::Resource(msg) => write!(f, "Resource limit exceeded: {}", msg),
            Error::Timeout(msg) => write!(f, "Operation timed out: {}", msg),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Cache(msg) => write!(f, "Cache error: {}", msg),
            Error::ExternalApi(msg) => write!(f, "External API error: {}", msg),
            Error::Routing(msg) => write!(f, "Routing error: {}", msg),
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(e) => Some(e),
            Error::Serialization(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Error::Database(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Network(error.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(error: uuid::Error) -> Self {
        Error::Validation(format!("invalid UUID: {}", error))
    }
}

impl From<crate::cache::CacheError> for Error {
    fn from(error: crate::cache::CacheError) -> Self {
        Error::Cache(error.to_string())
    }
}

// Common error constructors
impl Error {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        Error::Unauthorized(msg.into())
    }

    pub fn unsupported_media<T: Into<String>>(msg: T) -> Self {
        Error::UnsupportedMedia(msg.into())
    }

    pub fn resource<T: Into<String>>(msg: T) -> Self {
        Error::Resource(msg.into())
    }

    pub fn timeout<T: Into<String>>(msg: T) -> Self {
        Error::Timeout(msg.into())
    }

    pub fn storage<T: Into<String>>(msg: T) -> Self {
        Error::Storage(msg.into())
    }

    pub fn cache<T: Into<String>>(msg: T) -> Self {
        Error::Cache(msg.into())
    }

    pub fn external_api<T: Into<String>>(msg: T) -> Self {
        Error::ExternalApi(msg.into())
    }

    pub fn routing<T: Into<String>>(msg: T) -> Self {
        Error::Routing(msg.into())
    }

    pub fn network<T: Into<String>>(msg: T) -> Self {
        Error::Network(msg.into())
    }

    pub fn not_implemented<T: Into<String>>(msg: T) -> Self {
        Error::Other(format!("not implemented: {}", msg.into()))
    }
}

impl Error {
    /// HTTP status code for the control plane's error responder
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Unauthorized(_) => 401,
            Error::Validation(_) => 400,
            Error::Routing(_) => 400,
            Error::UnsupportedMedia(_) => 415,
            Error::Resource(_) => 413,
            Error::NotFound(_) => 404,
            Error::Timeout(_) => 504,
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Storage(_) => 500,
            Error::Cache(_) => 500,
            Error::ExternalApi(_) => 502,
            Error::Serialization(_) => 500,
            Error::Io(_) => 500,
            Error::Network(_) => 503,
            Error::Other(_) => 500,
        }
    }

    /// Error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::Unauthorized(_) => "auth",
            Error::Validation(_) => "validation",
            Error::Routing(_) => "routing",
            Error::UnsupportedMedia(_) => "unsupported_media",
            Error::Resource(_) => "resource",
            Error::NotFound(_) => "not_found",
            Error::Timeout(_) => "timeout",
            Error::Storage(_) => "storage",
            Error::Cache(_) => "cache",
            Error::ExternalApi(_) => "external_api",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Network(_) => "network",
            Error::Other(_) => "other",
        }
    }

    /// Whether a retry loop should treat this as retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Timeout(_) | Error::Cache(_) | Error::ExternalApi(_)
        )
    }
}

/// Detailed field-level validation errors, surfaced as a single
/// `Error::Validation` JSON body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub code: Option<String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
            code: None,
        });
    }

    pub fn add_with_code(
        &mut self,
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
            code: Some(code.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_error(self) -> Error {
        Error::Validation(serde_json::to_string(&self).unwrap_or_else(|_| "validation failed".to_string()))
    }
}

impl Default for ValidationErrors {
    fn default() -> Self {
        Self::new()
    }
}
