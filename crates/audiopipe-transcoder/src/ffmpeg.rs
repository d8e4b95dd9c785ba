//! `ffprobe` / `ffmpeg` implementation of [`MediaTool`].

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use audiopipe_core::config::ConverterConfig;

use crate::error::ToolError;
use crate::executor::{self, ExecutionParams};
use crate::tool::{MediaTool, ProbeReport, TranscodeReport};

/// Media tool backed by the ffmpeg command line programs.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    config: ConverterConfig,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl FfmpegTool {
    /// Create a tool from converter configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Arguments for `ffprobe`.
    pub fn probe_args(input: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            "error".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            input.to_string_lossy().into_owned(),
        ]
    }

    /// Arguments for `ffmpeg`: overwrite, drop video, encode audio.
    pub fn transcode_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-acodec".to_string(),
            self.config.audio_codec.clone(),
            "-ab".to_string(),
            self.config.audio_bitrate.clone(),
            "-ar".to_string(),
            self.config.sample_rate.clone(),
            output.to_string_lossy().into_owned(),
        ]
    }

    fn parse_probe(stdout: &str, stderr: String) -> Result<ProbeReport, ToolError> {
        let parsed: ProbeOutput =
            serde_json::from_str(stdout).map_err(|e| ToolError::Parse(e.to_string()))?;

        if parsed.streams.is_empty() {
            return Ok(ProbeReport::invalid(if stderr.is_empty() {
                "No media streams found".to_string()
            } else {
                stderr
            }));
        }

        let has_audio = parsed
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio"));
        let duration_seconds = parsed
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok());

        Ok(ProbeReport {
            valid: true,
            diagnostic: stderr,
            has_audio,
            duration_seconds,
        })
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn probe(&self, input: &Path) -> Result<ProbeReport, ToolError> {
        let params = ExecutionParams {
            command: self.config.ffprobe_path.clone(),
            args: Self::probe_args(input),
            working_dir: None,
            timeout_seconds: self.config.probe_timeout_seconds,
        };

        match executor::run(&params).await {
            Ok(output) => match Self::parse_probe(&output.stdout, output.stderr) {
                Ok(report) => Ok(report),
                Err(e) => {
                    warn!(input = %input.display(), error = %e, "Probe output unreadable");
                    Ok(ProbeReport::invalid(e.to_string()))
                }
            },
            Err(ToolError::ProcessFailed { stderr, .. }) => Ok(ProbeReport::invalid(stderr)),
            Err(e) => Err(e),
        }
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<TranscodeReport, ToolError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(input = %input.display(), output = %output.display(), "Transcoding");

        let params = ExecutionParams {
            command: self.config.ffmpeg_path.clone(),
            args: self.transcode_args(input, output),
            working_dir: None,
            timeout_seconds: self.config.transcode_timeout_seconds,
        };
        let result = executor::run(&params).await?;

        let output_size = match tokio::fs::metadata(output).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                warn!(output = %output.display(), "Tool succeeded but output file is missing");
                return Err(ToolError::OutputMissing(output.display().to_string()));
            }
        };

        info!(
            output = %output.display(),
            output_size,
            duration_ms = result.duration_ms,
            "Transcode finished"
        );
        Ok(TranscodeReport {
            output_path: output.to_path_buf(),
            diagnostic: result.stderr,
            output_size,
            duration_ms: result.duration_ms,
        })
    }
}
