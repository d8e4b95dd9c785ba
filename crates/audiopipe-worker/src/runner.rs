//! Worker runner: main loop that pulls deliveries into a bounded slot pool.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use audiopipe_broker::BrokerManager;
use audiopipe_core::config::WorkerConfig;
use audiopipe_core::error::AppError;
use audiopipe_core::result::AppResult;
use audiopipe_core::traits::broker::{Delivery, MessageBroker};

use crate::handler::{JobExecutionError, MessageHandler};

/// Consumes one queue with up to `concurrency` messages in flight.
#[derive(Debug, Clone)]
pub struct WorkerRunner {
    /// Broker to consume from
    broker: BrokerManager,
    /// Handler for every delivery
    handler: Arc<dyn MessageHandler>,
    /// Worker configuration
    config: WorkerConfig,
    /// Queue name
    queue: String,
    /// Consumer identifier within the queue's consumer group
    consumer: String,
}

impl WorkerRunner {
    /// Create a new worker runner
    pub fn new(
        broker: BrokerManager,
        handler: Arc<dyn MessageHandler>,
        config: WorkerConfig,
        queue: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            handler,
            config,
            queue: queue.into(),
            consumer: consumer.into(),
        }
    }

    /// Run until `cancel` fires or the delivery stream fails.
    ///
    /// In-flight messages are given `shutdown_timeout_seconds` to finish.
    /// A failing delivery stream is returned as an error so the process can
    /// exit and be restarted by its supervisor.
    pub async fn run(&self, cancel: CancellationToken) -> AppResult<()> {
        let mut deliveries = self.broker.consume(&self.queue, &self.consumer).await?;
        let concurrency = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let retry_delay = Duration::from_millis(self.config.retry_delay_ms);

        info!(
            handler = self.handler.name(),
            queue = %self.queue,
            consumer = %self.consumer,
            concurrency,
            "Worker started"
        );

        let mut failure = None;
        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        let _permit = permit;
                        settle(handler, delivery, retry_delay).await;
                    });
                }
                Some(Err(e)) => {
                    error!(queue = %self.queue, error = %e, "Delivery stream failed");
                    failure = Some(e);
                    break;
                }
                None => {
                    info!(queue = %self.queue, "Delivery stream ended");
                    break;
                }
            }
        }
        drop(deliveries);

        info!(queue = %self.queue, "Waiting for in-flight messages to complete");
        let all_slots = u32::try_from(concurrency).unwrap_or(u32::MAX);
        let drained = tokio::time::timeout(
            Duration::from_secs(self.config.shutdown_timeout_seconds),
            semaphore.acquire_many(all_slots),
        )
        .await;
        if drained.is_err() {
            warn!(
                queue = %self.queue,
                timeout_seconds = self.config.shutdown_timeout_seconds,
                "In-flight messages did not finish before shutdown timeout"
            );
        }

        info!(queue = %self.queue, "Worker stopped");
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Handle one delivery and acknowledge or release it.
///
/// The handler runs in its own task so a panic releases the delivery instead
/// of leaving it claimed.
async fn settle(handler: Arc<dyn MessageHandler>, delivery: Delivery, retry_delay: Duration) {
    debug!(
        handler = handler.name(),
        delivery_id = %delivery.id,
        delivery_count = delivery.delivery_count,
        "Handling delivery"
    );

    let task = tokio::spawn({
        let handler = Arc::clone(&handler);
        let delivery = delivery.clone();
        async move { handler.handle(&delivery).await }
    });
    let result = match task.await {
        Ok(result) => result,
        Err(join_err) => {
            error!(
                handler = handler.name(),
                delivery_id = %delivery.id,
                error = %join_err,
                "Handler task panicked"
            );
            Err(JobExecutionError::Internal(AppError::internal(format!(
                "Handler task failed: {join_err}"
            ))))
        }
    };

    let settled = match result {
        Ok(()) => delivery.ack().await,
        Err(e) if e.acknowledges() => {
            error!(delivery_id = %delivery.id, error = %e, "Message failed permanently, acknowledging");
            delivery.ack().await
        }
        Err(e) => {
            warn!(
                delivery_id = %delivery.id,
                delivery_count = delivery.delivery_count,
                error = %e,
                "Message failed, leaving for redelivery"
            );
            tokio::time::sleep(retry_delay).await;
            delivery.nack().await
        }
    };

    if let Err(e) = settled {
        error!(delivery_id = %delivery.id, error = %e, "Failed to settle delivery");
    }
}
