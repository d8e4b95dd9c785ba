//! Redis connection management.

use std::time::Duration;

use redis::Client;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use tracing::{info, warn};

use audiopipe_core::config::BrokerConfig;
use audiopipe_core::error::{AppError, ErrorKind};
use audiopipe_core::result::AppResult;

/// Redis client wrapper with connection management.
#[derive(Debug, Clone)]
pub struct RedisClient {
    client: Client,
    /// Shared reconnecting connection for publish and acknowledgment.
    conn: ConnectionManager,
    key_prefix: String,
    connect_timeout: Duration,
}

impl RedisClient {
    /// Connect to Redis, retrying with exponential backoff.
    pub async fn connect(config: &BrokerConfig) -> AppResult<Self> {
        info!(url = %config.redis.redacted_url(), "Connecting to Redis");

        let client = Client::open(config.redis.url.as_str()).map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Invalid Redis URL", e)
        })?;
        let connect_timeout = Duration::from_secs(config.connect_timeout_seconds);

        let mut backoff = Duration::from_millis(config.retry_backoff_ms);
        let mut attempt = 0u32;
        let conn = loop {
            attempt += 1;
            match open_manager(&client, connect_timeout, Some(connect_timeout)).await {
                Ok(conn) => break conn,
                Err(e) if attempt <= config.connect_retries => {
                    warn!(
                        attempt = attempt,
                        retry_in_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Redis connection attempt failed"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        };

        info!("Connected to Redis");
        Ok(Self {
            client,
            conn,
            key_prefix: config.redis.key_prefix.clone(),
            connect_timeout,
        })
    }

    /// Get a clone of the shared connection manager.
    pub fn conn_mut(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Open a dedicated connection for a blocking consumer.
    ///
    /// Replies may take up to `block` to arrive, so the response timeout is
    /// `block` plus the connect timeout.
    pub async fn dedicated(&self, block: Duration) -> AppResult<ConnectionManager> {
        open_manager(&self.client, self.connect_timeout, Some(block + self.connect_timeout)).await
    }

    /// Build a full key with the configured prefix.
    pub fn prefixed_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

async fn open_manager(
    client: &Client,
    timeout: Duration,
    response_timeout: Option<Duration>,
) -> AppResult<ConnectionManager> {
    let config = ConnectionManagerConfig::new()
        .set_connection_timeout(Some(timeout))
        .set_response_timeout(response_timeout);
    match tokio::time::timeout(timeout, ConnectionManager::new_with_config(client.clone(), config)).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(AppError::with_source(
            ErrorKind::Broker,
            format!("Failed to connect to Redis: {e}"),
            e,
        )),
        Err(_) => Err(AppError::broker(format!(
            "Timed out connecting to Redis after {}s",
            timeout.as_secs()
        ))),
    }
}
