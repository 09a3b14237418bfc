//! Offline batch AI processing: submit many archivist jobs as one request
//! to an external batch endpoint, poll it to completion, and distribute
//! results back into `ai_descriptions`.

pub mod audit;
pub mod batch_client;
pub mod cancel;
pub mod pending;
pub mod poll;
pub mod process;
pub mod submit;

pub use audit::JobgroupAuditLog;
pub use batch_client::BatchApiClient;
pub use cancel::cancel_jobgroup;
pub use pending::PendingJobgroupBuffer;
pub use poll::JobgroupPoller;
pub use process::JobgroupResultProcessor;
pub use submit::{JobgroupSubmitter, SubmissionOutcome};
