//! Conversion job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use audiopipe_core::types::JobId;

use super::status::JobStatus;

/// The single record every service observes for a job.
///
/// `output_path` is set only when `Completed`; `error` only when `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversionJob {
    /// Job identifier, immutable.
    pub job_id: JobId,
    /// Owning user; doubles as the notification recipient.
    pub user_id: String,
    /// Current status.
    pub status: JobStatus,
    /// Staged input file.
    pub input_path: Option<String>,
    /// Converted audio file.
    pub output_path: Option<String>,
    /// Failure detail.
    pub error: Option<String>,
    /// External tool attempts used by the final run.
    pub attempts: i32,
    /// When the notification for the terminal state was published.
    pub notified_at: Option<DateTime<Utc>>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ConversionJob {
    /// Build a fresh `processing` record.
    pub fn new_processing(job_id: JobId, user_id: impl Into<String>, input_path: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            user_id: user_id.into(),
            status: JobStatus::Processing,
            input_path,
            output_path: None,
            error: None,
            attempts: 0,
            notified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the job reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// A terminal job whose notification has not been published yet.
    pub fn needs_notification(&self) -> bool {
        self.is_terminal() && self.notified_at.is_none()
    }
}

/// Read model returned by status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusView {
    /// Job identifier.
    pub job_id: JobId,
    /// Current status.
    pub status: JobStatus,
    /// Converted file, when completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Failure detail, when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl From<&ConversionJob> for JobStatusView {
    fn from(job: &ConversionJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            output_path: job.output_path.clone(),
            error: job.error.clone(),
            updated_at: job.updated_at,
        }
    }
}
