//! In-memory queues with claim, acknowledgment and redelivery.
//!
//! A consumed message moves from the ready list to the in-flight map. `ack`
//! drops it, `nack` puts it back at the front of the ready list. Messages
//! still in flight when a consumer stream is dropped stay there; tests can
//! release them with [`MemoryBroker::requeue_in_flight`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use audiopipe_core::error::AppError;
use audiopipe_core::result::AppResult;
use audiopipe_core::traits::broker::{Acknowledger, Delivery, DeliveryStream, MessageBroker};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    payload: Bytes,
    delivery_count: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<String, StoredMessage>,
}

#[derive(Debug, Default)]
struct Shared {
    queues: Mutex<HashMap<String, QueueState>>,
    notify: Notify,
    next_id: AtomicU64,
    closed: CancellationToken,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, QueueState>> {
        // A poisoned lock only means a test panicked mid-operation.
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn claim(&self, queue: &str) -> Option<StoredMessage> {
        let mut queues = self.lock();
        let state = queues.entry(queue.to_string()).or_default();
        let mut message = state.ready.pop_front()?;
        message.delivery_count += 1;
        state.in_flight.insert(message.id.clone(), message.clone());
        Some(message)
    }
}

/// In-process message broker.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads waiting in a queue, in delivery order.
    pub fn pending(&self, queue: &str) -> Vec<Bytes> {
        self.shared
            .lock()
            .get(queue)
            .map(|q| q.ready.iter().map(|m| m.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of claimed but unacknowledged messages in a queue.
    pub fn in_flight(&self, queue: &str) -> usize {
        self.shared
            .lock()
            .get(queue)
            .map(|q| q.in_flight.len())
            .unwrap_or(0)
    }

    /// Return every in-flight message of a queue to the ready list, as if its
    /// consumer had crashed.
    pub fn requeue_in_flight(&self, queue: &str) {
        {
            let mut queues = self.shared.lock();
            if let Some(state) = queues.get_mut(queue) {
                let mut orphaned: Vec<StoredMessage> = state.in_flight.drain().map(|(_, m)| m).collect();
                orphaned.sort_by(|a, b| a.id.cmp(&b.id));
                for message in orphaned.into_iter().rev() {
                    state.ready.push_front(message);
                }
            }
        }
        self.shared.notify.notify_waiters();
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn publish(&self, queue: &str, payload: Bytes) -> AppResult<String> {
        if self.shared.closed.is_cancelled() {
            return Err(AppError::broker("Broker is closed"));
        }
        let seq = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("{seq:020}");
        self.shared
            .lock()
            .entry(queue.to_string())
            .or_default()
            .ready
            .push_back(StoredMessage {
                id: id.clone(),
                payload,
                delivery_count: 0,
            });
        self.shared.notify.notify_waiters();
        debug!(queue = %queue, message_id = %id, "Published message");
        Ok(id)
    }

    async fn consume(&self, queue: &str, consumer: &str) -> AppResult<DeliveryStream> {
        if self.shared.closed.is_cancelled() {
            return Err(AppError::broker("Broker is closed"));
        }
        debug!(queue = %queue, consumer = %consumer, "Subscribed to in-memory queue");

        let acker: Arc<dyn Acknowledger> = Arc::new(MemoryAcker {
            shared: self.shared.clone(),
            queue: queue.to_string(),
        });
        let state = (self.shared.clone(), queue.to_string(), acker);

        let deliveries = stream::unfold(state, |(shared, queue, acker)| async move {
            loop {
                if shared.closed.is_cancelled() {
                    return None;
                }

                let claimed = {
                    let notified = shared.notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    match shared.claim(&queue) {
                        Some(message) => Some(message),
                        None => {
                            tokio::select! {
                                _ = &mut notified => None,
                                _ = shared.closed.cancelled() => return None,
                            }
                        }
                    }
                };

                if let Some(message) = claimed {
                    let delivery = Delivery::new(
                        message.id,
                        queue.clone(),
                        message.payload,
                        message.delivery_count,
                        acker.clone(),
                    );
                    return Some((Ok::<_, AppError>(delivery), (shared, queue, acker)));
                }
            }
        });

        Ok(Box::pin(deliveries))
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(!self.shared.closed.is_cancelled())
    }

    async fn close(&self) -> AppResult<()> {
        self.shared.closed.cancel();
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryAcker {
    shared: Arc<Shared>,
    queue: String,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self, delivery_id: &str) -> AppResult<()> {
        if let Some(state) = self.shared.lock().get_mut(&self.queue) {
            state.in_flight.remove(delivery_id);
        }
        Ok(())
    }

    async fn nack(&self, delivery_id: &str) -> AppResult<()> {
        {
            let mut queues = self.shared.lock();
            if let Some(state) = queues.get_mut(&self.queue) {
                if let Some(message) = state.in_flight.remove(delivery_id) {
                    state.ready.push_front(message);
                }
            }
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn test_competing_consumers_each_claim_once() {
        let broker = MemoryBroker::new();
        broker.publish("q", Bytes::from_static(b"1")).await.unwrap();
        broker.publish("q", Bytes::from_static(b"2")).await.unwrap();

        let mut a = broker.consume("q", "a").await.unwrap();
        let mut b = broker.consume("q", "b").await.unwrap();

        let first = a.next().await.unwrap().unwrap();
        let second = b.next().await.unwrap().unwrap();
        assert_ne!(first.payload, second.payload);
        assert_eq!(broker.in_flight("q"), 2);

        first.ack().await.unwrap();
        second.ack().await.unwrap();
        assert_eq!(broker.in_flight("q"), 0);
    }

    #[tokio::test]
    async fn test_nack_redelivers_with_incremented_count() {
        let broker = MemoryBroker::new();
        broker.publish("q", Bytes::from_static(b"x")).await.unwrap();
        let mut stream = broker.consume("q", "c").await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.delivery_count, 1);
        first.nack().await.unwrap();

        let again = stream.next().await.unwrap().unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.delivery_count, 2);
    }

    #[tokio::test]
    async fn test_consumer_wakes_on_publish() {
        let broker = MemoryBroker::new();
        let mut stream = broker.consume("q", "c").await.unwrap();

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("q", Bytes::from_static(b"late")).await.unwrap();
        });

        let delivery = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(&delivery.payload[..], b"late");
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let broker = MemoryBroker::new();
        let mut stream = broker.consume("q", "c").await.unwrap();
        broker.close().await.unwrap();
        assert!(stream.next().await.is_none());
        assert!(broker.publish("q", Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_requeue_in_flight_simulates_crash() {
        let broker = MemoryBroker::new();
        broker.publish("q", Bytes::from_static(b"x")).await.unwrap();
        {
            let mut stream = broker.consume("q", "c").await.unwrap();
            let _claimed = stream.next().await.unwrap().unwrap();
        }
        assert_eq!(broker.in_flight("q"), 1);
        broker.requeue_in_flight("q");
        assert_eq!(broker.pending("q").len(), 1);
    }
}
