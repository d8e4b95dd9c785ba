//! Message broker trait for pluggable queue backends.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::result::AppResult;

/// A lazy stream of deliveries claimed from a queue.
///
/// An `Err` item means the subscription itself failed (connectivity) and
/// the consumer loop should stop.
pub type DeliveryStream = BoxStream<'static, AppResult<Delivery>>;

/// Trait for queue backends (Redis Streams or in-memory).
///
/// Queues are durable and shared by competing consumers. A delivery stays
/// claimed by one consumer until it is acknowledged; unacknowledged
/// deliveries are redelivered.
#[async_trait]
pub trait MessageBroker: Send + Sync + fmt::Debug + 'static {
    /// Publish a persistent message to a named queue.
    async fn publish(&self, queue: &str, payload: Bytes) -> AppResult<String>;

    /// Subscribe to a named queue as the given consumer.
    async fn consume(&self, queue: &str, consumer: &str) -> AppResult<DeliveryStream>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Close the connection. Open delivery streams end.
    async fn close(&self) -> AppResult<()>;
}

/// Settles a single delivery with its backend.
#[async_trait]
pub trait Acknowledger: Send + Sync + fmt::Debug + 'static {
    /// Mark the delivery as fully handled.
    async fn ack(&self, delivery_id: &str) -> AppResult<()>;

    /// Release the delivery for redelivery.
    async fn nack(&self, delivery_id: &str) -> AppResult<()>;
}

/// A message claimed from a queue together with its acknowledgment handle.
#[derive(Clone)]
pub struct Delivery {
    /// Backend-assigned delivery identifier.
    pub id: String,
    /// Queue the message was claimed from.
    pub queue: String,
    /// Raw JSON payload.
    pub payload: Bytes,
    /// How many times this message has been delivered, starting at 1.
    pub delivery_count: u64,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    /// Create a delivery bound to an acknowledger.
    pub fn new(
        id: impl Into<String>,
        queue: impl Into<String>,
        payload: Bytes,
        delivery_count: u64,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            id: id.into(),
            queue: queue.into(),
            payload,
            delivery_count,
            acker,
        }
    }

    /// Acknowledge the delivery.
    pub async fn ack(&self) -> AppResult<()> {
        self.acker.ack(&self.id).await
    }

    /// Leave the delivery unacknowledged so it is redelivered.
    pub async fn nack(&self) -> AppResult<()> {
        self.acker.nack(&self.id).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("id", &self.id)
            .field("queue", &self.queue)
            .field("payload_len", &self.payload.len())
            .field("delivery_count", &self.delivery_count)
            .finish()
    }
}
