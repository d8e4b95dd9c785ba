//! Consumer pool configuration.

use serde::{Deserialize, Serialize};

/// Queue consumer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent task slots per consumer loop.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Seconds to wait for in-flight messages during shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
    /// Milliseconds a slot waits before releasing a transiently failed
    /// message for redelivery.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Whether this process runs the conversion consumer.
    #[serde(default = "default_true")]
    pub conversion_enabled: bool,
    /// Whether this process runs the notification consumer.
    #[serde(default = "default_true")]
    pub notification_enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            retry_delay_ms: default_retry_delay(),
            conversion_enabled: true,
            notification_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    3
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_retry_delay() -> u64 {
    1000
}
