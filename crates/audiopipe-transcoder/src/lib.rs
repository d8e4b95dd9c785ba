//! # audiopipe-transcoder
//!
//! Runs the external media tools. [`MediaTool`] is the seam the conversion
//! worker depends on; [`FfmpegTool`] implements it with `ffprobe` and
//! `ffmpeg` child processes that are killed on timeout.

pub mod error;
pub mod executor;
pub mod ffmpeg;
pub mod tool;

pub use error::ToolError;
pub use ffmpeg::FfmpegTool;
pub use tool::{MediaTool, ProbeReport, TranscodeReport};
