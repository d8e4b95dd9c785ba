//! Conversion job status enumeration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a conversion job.
///
/// `Processing` is the only non-terminal state. A job never leaves
/// `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "conversion_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted and waiting for, or undergoing, conversion.
    Processing,
    /// Converted; the output file is available.
    Completed,
    /// Conversion failed; the error detail explains why.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check whether a record in this state may be moved to `next`.
    ///
    /// `Processing -> Processing` is allowed as an idempotent no-op.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Processing, _) => true,
            (Self::Completed | Self::Failed, _) => false,
        }
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown job status: {other}")),
        }
    }
}
