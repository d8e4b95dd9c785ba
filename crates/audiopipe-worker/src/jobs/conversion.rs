//! Work queue handler.

use async_trait::async_trait;
use tracing::{debug, warn};

use audiopipe_core::error::AppError;
use audiopipe_core::traits::broker::Delivery;
use audiopipe_entity::message::WorkMessage;
use audiopipe_service::ConversionService;
use audiopipe_service::conversion::{ConversionError, ConversionOutcome};

use crate::handler::{JobExecutionError, MessageHandler};

/// Runs conversions for work messages.
#[derive(Debug, Clone)]
pub struct ConversionHandler {
    service: ConversionService,
}

impl ConversionHandler {
    /// Create a new conversion handler.
    pub fn new(service: ConversionService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for ConversionHandler {
    fn name(&self) -> &str {
        "conversion"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), JobExecutionError> {
        let message = WorkMessage::decode(&delivery.payload)
            .map_err(|e| JobExecutionError::Permanent(format!("Malformed work message: {e}")))?;

        let outcome = self
            .service
            .process(&message)
            .await
            .map_err(classify)?;

        match outcome {
            ConversionOutcome::Superseded => {
                warn!(job_id = %message.job_id, "Conversion result superseded");
            }
            other => debug!(job_id = %message.job_id, outcome = ?other, "Work message settled"),
        }
        Ok(())
    }
}

/// Connectivity failures are transient; anything else is internal. Both are
/// redelivered.
fn classify(err: ConversionError) -> JobExecutionError {
    let err = AppError::from(err);
    if err.is_transient() {
        JobExecutionError::Transient(err.to_string())
    } else {
        JobExecutionError::Internal(err)
    }
}

#[cfg(test)]
mod tests {
    use audiopipe_core::error::ErrorKind;

    use super::*;

    #[test]
    fn test_store_outage_is_transient() {
        let err = classify(ConversionError::Store(AppError::database("connection reset")));
        assert!(matches!(err, JobExecutionError::Transient(_)));
        assert!(!err.acknowledges());
    }

    #[test]
    fn test_output_placement_failure_is_internal() {
        let err = classify(ConversionError::Output(AppError::storage("disk full")));
        match err {
            JobExecutionError::Internal(e) => assert_eq!(e.kind, ErrorKind::Storage),
            other => panic!("unexpected {other:?}"),
        }
    }
}
