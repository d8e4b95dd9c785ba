//! Notification service.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use audiopipe_core::config::TemplateConfig;
use audiopipe_database::store::NotificationLogStore;
use audiopipe_entity::message::NotificationMessage;
use audiopipe_entity::notification::NotificationLogEntry;

use super::relay::MailRelay;
use super::template::render;
use crate::intake::validation::validate_recipient;

/// How a notification message was settled. Every variant is final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// The relay accepted the mail.
    Sent,
    /// The relay failed; the failure is recorded in the delivery log.
    RelayFailed(String),
    /// The message was malformed or addressed to an invalid recipient.
    Dropped(String),
}

/// Renders and delivers status emails.
#[derive(Debug, Clone)]
pub struct NotificationService {
    relay: Arc<dyn MailRelay>,
    log: Arc<dyn NotificationLogStore>,
    templates: TemplateConfig,
}

impl NotificationService {
    /// Create a new notification service.
    pub fn new(relay: Arc<dyn MailRelay>, log: Arc<dyn NotificationLogStore>, templates: TemplateConfig) -> Self {
        Self {
            relay,
            log,
            templates,
        }
    }

    /// Handle one raw notification payload.
    ///
    /// Never touches job records and never fails: malformed input is dropped,
    /// relay and log-store failures are logged.
    pub async fn handle(&self, payload: &[u8]) -> NotificationOutcome {
        let message = match Self::decode(payload) {
            Ok(message) => message,
            Err(reason) => {
                warn!(reason = %reason, "Dropping malformed notification");
                return NotificationOutcome::Dropped(reason);
            }
        };

        if let Err(e) = validate_recipient(&message.user_id) {
            warn!(job_id = %message.job_id, error = %e, "Dropping notification with invalid recipient");
            return NotificationOutcome::Dropped(e.message);
        }

        let mail = render(
            &self.templates,
            &message.status,
            message.job_id.as_str(),
            message.error.as_deref(),
        );

        let (entry, outcome) = match self.relay.send(&message.user_id, &mail.subject, &mail.body).await {
            Ok(()) => {
                info!(
                    job_id = %message.job_id,
                    status = %message.status,
                    subject = %mail.subject,
                    "Notification sent"
                );
                (
                    NotificationLogEntry::sent(message.job_id.clone(), &message.user_id, &mail.subject),
                    NotificationOutcome::Sent,
                )
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(job_id = %message.job_id, error = %reason, "Notification delivery failed");
                (
                    NotificationLogEntry::failed(
                        message.job_id.clone(),
                        &message.user_id,
                        &mail.subject,
                        reason.clone(),
                    ),
                    NotificationOutcome::RelayFailed(reason),
                )
            }
        };

        if let Err(e) = self.log.append(&entry).await {
            warn!(job_id = %message.job_id, error = %e, "Failed to record notification delivery");
        }
        outcome
    }

    fn decode(payload: &[u8]) -> Result<NotificationMessage, String> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| format!("Invalid JSON: {e}"))?;
        NotificationMessage::from_value(&value)
    }
}
