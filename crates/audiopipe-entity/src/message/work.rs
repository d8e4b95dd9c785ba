//! Work queue message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use audiopipe_core::types::JobId;

/// Published by intake, consumed by the conversion worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkMessage {
    /// Job to convert.
    pub job_id: JobId,
    /// Staged input file.
    pub file_path: String,
    /// Owning user.
    pub user_id: String,
    /// When the message was produced.
    #[serde(with = "super::timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl WorkMessage {
    /// Create a work message stamped with the current time.
    pub fn new(job_id: JobId, file_path: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            job_id,
            file_path: file_path.into(),
            user_id: user_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Decode a queue payload, rejecting blank paths and recipients.
    ///
    /// The job identifier is checked while deserializing.
    pub fn decode(payload: &[u8]) -> Result<Self, String> {
        let message: Self = serde_json::from_slice(payload).map_err(|e| e.to_string())?;
        if message.file_path.trim().is_empty() {
            return Err("missing required field 'file_path'".to_string());
        }
        if message.user_id.trim().is_empty() {
            return Err("missing required field 'user_id'".to_string());
        }
        Ok(message)
    }
}
