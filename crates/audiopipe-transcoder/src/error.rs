//! External tool errors.

use thiserror::Error;

use audiopipe_core::error::{AppError, ErrorKind};

/// Errors from running the media tools.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The process exited with a non-zero code.
    #[error("Tool exited with code {code}: {stderr}")]
    ProcessFailed {
        /// Exit code, `-1` when killed by a signal.
        code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// The process did not finish in time and was killed.
    #[error("Tool timed out after {0} seconds")]
    Timeout(u64),

    /// The process could not be started.
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        /// Command that failed to start.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The tool reported success but the output file does not exist.
    #[error("Expected output file not created: {0}")]
    OutputMissing(String),

    /// The probe output could not be parsed.
    #[error("Unreadable probe output: {0}")]
    Parse(String),

    /// File system error around the tool invocation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Timeouts and spawn failures may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Spawn { .. })
    }
}

impl From<ToolError> for AppError {
    fn from(err: ToolError) -> Self {
        let kind = match &err {
            ToolError::Timeout(_) => ErrorKind::Timeout,
            ToolError::Io(_) => ErrorKind::Storage,
            _ => ErrorKind::ExternalTool,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}
