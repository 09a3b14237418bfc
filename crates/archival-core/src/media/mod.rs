//! Blob storage: key conventions, idempotent upload, and download for the
//! three buckets this service writes into (standard derivatives, archive
//! bundles, and files used for the batch API's own uploads).

pub mod blob_store;
pub mod keys;

pub use blob_store::{BlobStore, Buckets};
pub use keys::{derivative_key, landing_key, preservation_bundle_key, Derivative};
