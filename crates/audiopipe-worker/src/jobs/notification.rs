//! Notification queue handler.

use async_trait::async_trait;
use tracing::debug;

use audiopipe_core::traits::broker::Delivery;
use audiopipe_service::NotificationService;

use crate::handler::{JobExecutionError, MessageHandler};

/// Delivers status emails. Every message is settled on first handling.
#[derive(Debug, Clone)]
pub struct NotificationHandler {
    service: NotificationService,
}

impl NotificationHandler {
    /// Create a new notification handler.
    pub fn new(service: NotificationService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for NotificationHandler {
    fn name(&self) -> &str {
        "notification"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), JobExecutionError> {
        let outcome = self.service.handle(&delivery.payload).await;
        debug!(delivery_id = %delivery.id, outcome = ?outcome, "Notification settled");
        Ok(())
    }
}
