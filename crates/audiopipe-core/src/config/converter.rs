//! External transcoder configuration.

use serde::{Deserialize, Serialize};

/// ffmpeg/ffprobe invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path or name of the ffmpeg executable.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,
    /// Path or name of the ffprobe executable.
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: String,
    /// Audio codec passed to `-acodec`.
    #[serde(default = "default_codec")]
    pub audio_codec: String,
    /// Audio bitrate passed to `-ab`.
    #[serde(default = "default_bitrate")]
    pub audio_bitrate: String,
    /// Sample rate passed to `-ar`.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: String,
    /// Extension of the produced audio file (without the dot).
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
    /// Probe timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    /// Transcode timeout in seconds.
    #[serde(default = "default_transcode_timeout")]
    pub transcode_timeout_seconds: u64,
    /// Maximum bytes of tool diagnostic kept in the job record.
    #[serde(default = "default_max_diagnostic")]
    pub max_diagnostic_bytes: usize,
    /// Retry policy for tool failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: default_ffprobe(),
            audio_codec: default_codec(),
            audio_bitrate: default_bitrate(),
            sample_rate: default_sample_rate(),
            output_extension: default_output_extension(),
            probe_timeout_seconds: default_probe_timeout(),
            transcode_timeout_seconds: default_transcode_timeout(),
            max_diagnostic_bytes: default_max_diagnostic(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry policy for external tool failures.
///
/// The default of one attempt keeps tool failures terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in seconds.
    #[serde(default = "default_delay")]
    pub delay_seconds: u64,
    /// Multiplier applied to the delay after each retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Also retry non-zero tool exits, not only timeouts and spawn errors.
    #[serde(default)]
    pub retry_tool_failures: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_seconds: default_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            retry_tool_failures: false,
        }
    }
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_codec() -> String {
    "libmp3lame".to_string()
}

fn default_bitrate() -> String {
    "192k".to_string()
}

fn default_sample_rate() -> String {
    "44100".to_string()
}

fn default_output_extension() -> String {
    "mp3".to_string()
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_transcode_timeout() -> u64 {
    600
}

fn default_max_diagnostic() -> usize {
    16 * 1024
}

fn default_max_attempts() -> u32 {
    1
}

fn default_delay() -> u64 {
    5
}

fn default_backoff_multiplier() -> f64 {
    2.0
}
