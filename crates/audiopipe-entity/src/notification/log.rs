//! Append-only record of notification delivery attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use audiopipe_core::types::JobId;

/// Outcome of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "delivery_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// The relay accepted the message.
    Sent,
    /// The relay rejected the message or was unreachable.
    Failed,
}

/// One entry per delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationLogEntry {
    /// Job the notification was about.
    pub job_id: JobId,
    /// Recipient address.
    pub email: String,
    /// Rendered subject.
    pub subject: String,
    /// Delivery outcome.
    pub status: DeliveryStatus,
    /// Relay error when the attempt failed.
    pub error: Option<String>,
    /// When the attempt was made.
    pub timestamp: DateTime<Utc>,
}

impl NotificationLogEntry {
    /// A successful delivery.
    pub fn sent(job_id: JobId, email: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            job_id,
            email: email.into(),
            subject: subject.into(),
            status: DeliveryStatus::Sent,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// A failed delivery with the relay error.
    pub fn failed(
        job_id: JobId,
        email: impl Into<String>,
        subject: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            email: email.into(),
            subject: subject.into(),
            status: DeliveryStatus::Failed,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}
