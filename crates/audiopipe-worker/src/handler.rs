//! Message handler contract.

use async_trait::async_trait;

use audiopipe_core::error::AppError;
use audiopipe_core::traits::broker::Delivery;

/// Processes deliveries from one queue.
#[async_trait]
pub trait MessageHandler: Send + Sync + std::fmt::Debug + 'static {
    /// Handler name used in logs.
    fn name(&self) -> &str;

    /// Handle a delivery. `Ok` acknowledges it.
    async fn handle(&self, delivery: &Delivery) -> Result<(), JobExecutionError>;
}

/// Error from message handling. Decides acknowledgement.
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// Permanent failure: acknowledge, never redeliver
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// Transient failure: leave for redelivery
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Internal error: leave for redelivery
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

impl JobExecutionError {
    /// Whether the delivery should be acknowledged despite the failure.
    pub fn acknowledges(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}
