//! Broker manager that dispatches to the configured provider.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use audiopipe_core::config::BrokerConfig;
use audiopipe_core::error::AppError;
use audiopipe_core::result::AppResult;
use audiopipe_core::traits::broker::{DeliveryStream, MessageBroker};

/// Broker manager that wraps the configured provider.
///
/// Constructed once per process and shared by every publisher and consumer.
#[derive(Debug, Clone)]
pub struct BrokerManager {
    inner: Arc<dyn MessageBroker>,
}

impl BrokerManager {
    /// Connect to the broker selected by configuration.
    pub async fn connect(config: &BrokerConfig) -> AppResult<Self> {
        let inner: Arc<dyn MessageBroker> = match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis Streams broker");
                let client = crate::redis::RedisClient::connect(config).await?;
                Arc::new(crate::redis::RedisStreamsBroker::new(client, &config.redis))
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory broker");
                Arc::new(crate::memory::MemoryBroker::new())
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown broker provider: '{other}'. Supported: memory, redis"
                )));
            }
        };

        Ok(Self { inner })
    }

    /// Create a broker manager from an existing provider (for testing).
    pub fn from_provider(provider: Arc<dyn MessageBroker>) -> Self {
        Self { inner: provider }
    }

    /// Serialize a message as JSON and publish it.
    pub async fn publish_json<T: Serialize + Sync>(&self, queue: &str, message: &T) -> AppResult<String> {
        let payload = serde_json::to_vec(message)?;
        self.inner.publish(queue, Bytes::from(payload)).await
    }
}

#[async_trait]
impl MessageBroker for BrokerManager {
    async fn publish(&self, queue: &str, payload: Bytes) -> AppResult<String> {
        self.inner.publish(queue, payload).await
    }

    async fn consume(&self, queue: &str, consumer: &str) -> AppResult<DeliveryStream> {
        self.inner.consume(queue, consumer).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }

    async fn close(&self) -> AppResult<()> {
        self.inner.close().await
    }
}
