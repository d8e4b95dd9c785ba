//! Message broker configuration.

use serde::{Deserialize, Serialize};

/// Top-level broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker provider type: `"redis"` or `"memory"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Queue carrying work messages from intake to the conversion worker.
    #[serde(default = "default_work_queue")]
    pub work_queue: String,
    /// Queue carrying notification messages to the notification worker.
    #[serde(default = "default_notification_queue")]
    pub notification_queue: String,
    /// Timeout in seconds for a single connection attempt.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Additional connection attempts after the first one fails.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    /// Initial backoff between connection attempts in milliseconds.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    /// Redis Streams backend configuration.
    #[serde(default)]
    pub redis: RedisBrokerConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            work_queue: default_work_queue(),
            notification_queue: default_notification_queue(),
            connect_timeout_seconds: default_connect_timeout(),
            connect_retries: default_connect_retries(),
            retry_backoff_ms: default_retry_backoff(),
            redis: RedisBrokerConfig::default(),
        }
    }
}

/// Redis Streams broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisBrokerConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Key prefix for every queue stream.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Consumer group shared by all competing consumers of a queue.
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// Maximum entries fetched per read.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// How long a read blocks waiting for new entries, in milliseconds.
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
    /// Pending entries idle longer than this are reclaimed for redelivery.
    #[serde(default = "default_claim_idle_ms")]
    pub claim_idle_ms: u64,
    /// Entries delivered more often than this are moved to the dead-letter stream.
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u64,
}

impl Default for RedisBrokerConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            consumer_group: default_consumer_group(),
            batch_size: default_batch_size(),
            block_ms: default_block_ms(),
            claim_idle_ms: default_claim_idle_ms(),
            max_deliveries: default_max_deliveries(),
        }
    }
}

impl RedisBrokerConfig {
    /// The connection URL with its password masked.
    pub fn redacted_url(&self) -> String {
        super::redact_url(&self.url)
    }
}

fn default_provider() -> String {
    "redis".to_string()
}

fn default_work_queue() -> String {
    "video_processing".to_string()
}

fn default_notification_queue() -> String {
    "notifications".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_connect_retries() -> u32 {
    5
}

fn default_retry_backoff() -> u64 {
    500
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "audiopipe:".to_string()
}

fn default_consumer_group() -> String {
    "audiopipe-workers".to_string()
}

fn default_batch_size() -> usize {
    1
}

fn default_block_ms() -> u64 {
    2000
}

fn default_claim_idle_ms() -> u64 {
    // Longer than the default transcode timeout so a live worker keeps its claim.
    15 * 60 * 1000
}

fn default_max_deliveries() -> u64 {
    5
}
