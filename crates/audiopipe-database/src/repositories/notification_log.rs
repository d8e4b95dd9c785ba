//! Notification log repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use audiopipe_core::error::{AppError, ErrorKind};
use audiopipe_core::result::AppResult;
use audiopipe_core::types::JobId;
use audiopipe_entity::notification::NotificationLogEntry;

use crate::store::NotificationLogStore;

/// Repository for notification delivery attempts.
#[derive(Debug, Clone)]
pub struct NotificationLogRepository {
    pool: PgPool,
}

impl NotificationLogRepository {
    /// Create a new notification log repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationLogStore for NotificationLogRepository {
    async fn append(&self, entry: &NotificationLogEntry) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO notification_log (job_id, email, subject, status, error, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&entry.job_id)
        .bind(&entry.email)
        .bind(&entry.subject)
        .bind(entry.status)
        .bind(&entry.error)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to append notification log", e)
        })?;
        Ok(())
    }

    async fn list_for_job(&self, job_id: &JobId) -> AppResult<Vec<NotificationLogEntry>> {
        sqlx::query_as::<_, NotificationLogEntry>(
            "SELECT job_id, email, subject, status, error, timestamp \
             FROM notification_log WHERE job_id = $1 ORDER BY timestamp ASC, id ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list notification log", e)
        })
    }
}
