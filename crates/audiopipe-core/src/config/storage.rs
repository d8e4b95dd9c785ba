//! Staging and output storage configuration.

use serde::{Deserialize, Serialize};

/// File storage configuration shared by intake and the conversion worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding uploaded files until the worker consumes them.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    /// Directory receiving converted audio files.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Maximum upload size in bytes (default 100 MiB).
    #[serde(default = "default_max_upload")]
    pub max_upload_size_bytes: u64,
    /// Accepted upload extensions, including the leading dot.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            output_dir: default_output_dir(),
            max_upload_size_bytes: default_max_upload(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_upload_dir() -> String {
    "/tmp/uploads".to_string()
}

fn default_output_dir() -> String {
    "/tmp/converted".to_string()
}

fn default_max_upload() -> u64 {
    100 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    [".mp4", ".avi", ".mkv", ".mov"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
