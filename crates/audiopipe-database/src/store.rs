//! Store contracts shared by the services.
//!
//! Every write is an upsert keyed by job identifier and is guarded so that a
//! terminal record is never modified again.

use async_trait::async_trait;

use audiopipe_core::result::AppResult;
use audiopipe_core::types::JobId;
use audiopipe_entity::job::{ConversionJob, JobStatus};
use audiopipe_entity::notification::NotificationLogEntry;

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Create the record as `processing`, or leave a `processing` record in
    /// place. Missing `input_path` on an existing record is filled in.
    Processing {
        /// Owning user.
        user_id: String,
        /// Staged input file.
        input_path: Option<String>,
    },
    /// Move a `processing` record to `completed`.
    Completed {
        /// Converted audio file.
        output_path: String,
        /// Tool attempts used.
        attempts: i32,
    },
    /// Move a `processing` record to `failed`.
    Failed {
        /// Failure detail.
        error: String,
        /// Tool attempts used.
        attempts: i32,
    },
}

impl StatusUpdate {
    /// The status this update moves the record to.
    pub fn target(&self) -> JobStatus {
        match self {
            Self::Processing { .. } => JobStatus::Processing,
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Result of a guarded write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The record was created or updated.
    Applied,
    /// The record was left untouched (terminal, or absent for a terminal update).
    Noop,
}

/// Job record persistence.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert the initial `processing` record. Fails with `Conflict` if the
    /// job already exists.
    async fn insert_initial(&self, job: &ConversionJob) -> AppResult<()>;

    /// Apply a guarded status change.
    async fn transition(&self, job_id: &JobId, update: StatusUpdate) -> AppResult<TransitionOutcome>;

    /// Fetch a job record.
    async fn find(&self, job_id: &JobId) -> AppResult<Option<ConversionJob>>;

    /// Stamp `notified_at` on a terminal record if not yet stamped.
    async fn mark_notified(&self, job_id: &JobId) -> AppResult<()>;
}

/// Append-only notification delivery log.
#[async_trait]
pub trait NotificationLogStore: Send + Sync + std::fmt::Debug + 'static {
    /// Append an entry.
    async fn append(&self, entry: &NotificationLogEntry) -> AppResult<()>;

    /// List entries for a job, oldest first.
    async fn list_for_job(&self, job_id: &JobId) -> AppResult<Vec<NotificationLogEntry>>;
}
