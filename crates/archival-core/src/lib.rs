pub mod cache;
pub mod common;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod jobgroup;
pub mod jobs;
pub mod media;
pub mod pipelines;
pub mod traits;
pub mod webhook;

pub use cache::{CacheError, RedisConfig, RedisPool};
pub use config::Config;
pub use db::{AiDescriptionRepository, AssetVersionRepository, Database, DbStatus, JobgroupRepository, JobgroupResultRepository, Migrator};
pub use error::{Error, Result, ValidationErrors};
pub use health::HealthSnapshot;
pub use jobs::{Job, JobMetrics, JobQueue, Worker};
pub use media::BlobStore;
pub use traits::Repository;

/// Current version of this service
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_creation() {
        let err = Error::validation("Test validation error");
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.category(), "validation");
    }
}
