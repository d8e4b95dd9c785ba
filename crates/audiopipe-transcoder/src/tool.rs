//! The media tool contract.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ToolError;

/// Outcome of probing an input file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    /// Whether the file is a readable media container.
    pub valid: bool,
    /// Tool diagnostic output.
    pub diagnostic: String,
    /// Whether at least one audio stream was found.
    pub has_audio: bool,
    /// Container duration, when reported.
    pub duration_seconds: Option<f64>,
}

impl ProbeReport {
    /// A report for an unreadable file.
    pub fn invalid(diagnostic: impl Into<String>) -> Self {
        Self {
            valid: false,
            diagnostic: diagnostic.into(),
            has_audio: false,
            duration_seconds: None,
        }
    }
}

/// Outcome of a successful transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeReport {
    /// The produced audio file.
    pub output_path: PathBuf,
    /// Tool diagnostic output.
    pub diagnostic: String,
    /// Size of the produced file in bytes.
    pub output_size: u64,
    /// Wall-clock duration.
    pub duration_ms: u64,
}

/// External media tool used by the conversion worker.
#[async_trait]
pub trait MediaTool: Send + Sync + std::fmt::Debug + 'static {
    /// Inspect an input file.
    ///
    /// An unreadable file is `Ok` with `valid = false`; `Err` is reserved for
    /// failures to run the tool at all.
    async fn probe(&self, input: &Path) -> Result<ProbeReport, ToolError>;

    /// Convert `input` into an audio file at `output`.
    async fn transcode(&self, input: &Path, output: &Path) -> Result<TranscodeReport, ToolError>;
}
