//! Notification queue message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use audiopipe_core::types::JobId;

use crate::job::JobStatus;

/// Published by the conversion worker once a job reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Recipient; the job's owning user.
    pub user_id: String,
    /// Job the notification is about.
    pub job_id: JobId,
    /// Job status as a string; unknown values select the fallback template.
    pub status: String,
    /// Failure detail.
    #[serde(default)]
    pub error: Option<String>,
    /// When the message was produced.
    #[serde(with = "super::timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl NotificationMessage {
    /// Create a notification for a job status.
    pub fn new(user_id: impl Into<String>, job_id: JobId, status: JobStatus, error: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            job_id,
            status: status.as_str().to_string(),
            error,
            timestamp: Utc::now(),
        }
    }

    /// Extract a notification from an arbitrary JSON value.
    ///
    /// Only `job_id`, `user_id` and `status` are required, and they must be
    /// non-empty strings. A missing or unreadable timestamp becomes "now".
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let field = |name: &str| -> Result<String, String> {
            match value.get(name).and_then(Value::as_str).map(str::trim) {
                Some(s) if !s.is_empty() => Ok(s.to_string()),
                _ => Err(format!("missing required field '{name}'")),
            }
        };

        let job_id: JobId = field("job_id")?.parse().map_err(|e| format!("{e}"))?;
        let user_id = field("user_id")?;
        let status = field("status")?;
        let error = value
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string);
        let timestamp = value
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(super::timestamp::parse)
            .unwrap_or_else(Utc::now);

        Ok(Self {
            user_id,
            job_id,
            status,
            error,
            timestamp,
        })
    }

    /// The status as a typed value, if it is a known job status.
    pub fn job_status(&self) -> Option<JobStatus> {
        self.status.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_requires_core_fields() {
        let missing_status = json!({"job_id": "J1", "user_id": "u@x.io"});
        assert!(NotificationMessage::from_value(&missing_status).is_err());

        let blank_user = json!({"job_id": "J1", "user_id": "", "status": "completed"});
        assert!(NotificationMessage::from_value(&blank_user).is_err());
    }

    #[test]
    fn test_from_value_tolerates_null_error_and_naive_timestamp() {
        let value = json!({
            "job_id": "J1",
            "user_id": "u@x.io",
            "status": "failed",
            "error": null,
            "timestamp": "2024-01-01T00:00:00"
        });
        let msg = NotificationMessage::from_value(&value).unwrap();
        assert_eq!(msg.job_status(), Some(JobStatus::Failed));
        assert!(msg.error.is_none());
    }

    #[test]
    fn test_serialized_error_is_null_when_absent() {
        let msg = NotificationMessage::new("u@x.io", "J1".parse().unwrap(), JobStatus::Completed, None);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json["error"].is_null());
    }
}
