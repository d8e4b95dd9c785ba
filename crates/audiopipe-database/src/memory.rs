//! In-process stores with the same guarded-write semantics as PostgreSQL.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use audiopipe_core::error::AppError;
use audiopipe_core::result::AppResult;
use audiopipe_core::types::JobId;
use audiopipe_entity::job::{ConversionJob, JobStatus};
use audiopipe_entity::notification::NotificationLogEntry;

use crate::store::{JobStore, NotificationLogStore, StatusUpdate, TransitionOutcome};

/// Job store backed by a map.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, ConversionJob>>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record.
    pub async fn all(&self) -> Vec<ConversionJob> {
        self.jobs.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_initial(&self, job: &ConversionJob) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.job_id) {
            return Err(AppError::conflict(format!("Job {} already exists", job.job_id)));
        }
        jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn transition(&self, job_id: &JobId, update: StatusUpdate) -> AppResult<TransitionOutcome> {
        let mut jobs = self.jobs.write().await;
        let now = Utc::now();

        if !jobs.contains_key(job_id) {
            return Ok(match update {
                StatusUpdate::Processing {
                    user_id,
                    input_path,
                } => {
                    jobs.insert(
                        job_id.clone(),
                        ConversionJob::new_processing(job_id.clone(), user_id, input_path),
                    );
                    TransitionOutcome::Applied
                }
                _ => TransitionOutcome::Noop,
            });
        }
        let Some(job) = jobs.get_mut(job_id) else {
            return Ok(TransitionOutcome::Noop);
        };

        if !job.status.can_transition_to(update.target()) {
            return Ok(TransitionOutcome::Noop);
        }

        match update {
            StatusUpdate::Processing { input_path, .. } => {
                if job.input_path.is_none() {
                    job.input_path = input_path;
                }
            }
            StatusUpdate::Completed {
                output_path,
                attempts,
            } => {
                job.status = JobStatus::Completed;
                job.output_path = Some(output_path);
                job.error = None;
                job.attempts = attempts;
            }
            StatusUpdate::Failed { error, attempts } => {
                job.status = JobStatus::Failed;
                job.error = Some(error);
                job.output_path = None;
                job.attempts = attempts;
            }
        }
        job.updated_at = now;
        Ok(TransitionOutcome::Applied)
    }

    async fn find(&self, job_id: &JobId) -> AppResult<Option<ConversionJob>> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn mark_notified(&self, job_id: &JobId) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(job_id) {
            if job.is_terminal() && job.notified_at.is_none() {
                job.notified_at = Some(Utc::now());
            }
        }
        Ok(())
    }
}

/// Notification log backed by a vector.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotificationLog {
    entries: Arc<RwLock<Vec<NotificationLogEntry>>>,
}

impl MemoryNotificationLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry.
    pub async fn entries(&self) -> Vec<NotificationLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl NotificationLogStore for MemoryNotificationLog {
    async fn append(&self, entry: &NotificationLogEntry) -> AppResult<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_for_job(&self, job_id: &JobId) -> AppResult<Vec<NotificationLogEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| &e.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use audiopipe_entity::notification::DeliveryStatus;

    use super::*;

    fn id(s: &str) -> JobId {
        s.parse().unwrap()
    }

    fn processing(user: &str) -> StatusUpdate {
        StatusUpdate::Processing {
            user_id: user.to_string(),
            input_path: Some("/up/in.mp4".to_string()),
        }
    }

    #[tokio::test]
    async fn test_processing_upsert_creates_then_noops_in_place() {
        let store = MemoryJobStore::new();
        let job = id("J1");

        assert_eq!(store.transition(&job, processing("u@x.io")).await.unwrap(), TransitionOutcome::Applied);
        assert_eq!(store.transition(&job, processing("u@x.io")).await.unwrap(), TransitionOutcome::Applied);

        let record = store.find(&job).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Processing);
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_record_never_regresses() {
        let store = MemoryJobStore::new();
        let job = id("J1");
        store.transition(&job, processing("u@x.io")).await.unwrap();
        store
            .transition(
                &job,
                StatusUpdate::Completed {
                    output_path: "/out/J1.mp3".to_string(),
                    attempts: 1,
                },
            )
            .await
            .unwrap();

        let again = store.transition(&job, processing("u@x.io")).await.unwrap();
        let fail = store
            .transition(
                &job,
                StatusUpdate::Failed {
                    error: "late".to_string(),
                    attempts: 1,
                },
            )
            .await
            .unwrap();

        assert_eq!(again, TransitionOutcome::Noop);
        assert_eq!(fail, TransitionOutcome::Noop);
        let record = store.find(&job).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.output_path.as_deref(), Some("/out/J1.mp3"));
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_terminal_update_on_missing_record_is_noop() {
        let store = MemoryJobStore::new();
        let outcome = store
            .transition(
                &id("ghost"),
                StatusUpdate::Failed {
                    error: "x".to_string(),
                    attempts: 0,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Noop);
        assert!(store.find(&id("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_initial_conflicts_on_duplicate() {
        let store = MemoryJobStore::new();
        let job = ConversionJob::new_processing(id("J1"), "u@x.io", None);
        store.insert_initial(&job).await.unwrap();
        let err = store.insert_initial(&job).await.unwrap_err();
        assert_eq!(err.kind, audiopipe_core::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_mark_notified_only_stamps_terminal_once() {
        let store = MemoryJobStore::new();
        let job = id("J1");
        store.transition(&job, processing("u@x.io")).await.unwrap();
        store.mark_notified(&job).await.unwrap();
        assert!(store.find(&job).await.unwrap().unwrap().notified_at.is_none());

        store
            .transition(
                &job,
                StatusUpdate::Failed {
                    error: "boom".to_string(),
                    attempts: 1,
                },
            )
            .await
            .unwrap();
        store.mark_notified(&job).await.unwrap();
        let first = store.find(&job).await.unwrap().unwrap().notified_at;
        store.mark_notified(&job).await.unwrap();
        let second = store.find(&job).await.unwrap().unwrap().notified_at;
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_log_lists_entries_of_one_job_in_order() {
        let log = MemoryNotificationLog::new();
        log.append(&NotificationLogEntry::failed(id("J1"), "u@x.io", "Video Conversion Failed", "421"))
            .await
            .unwrap();
        log.append(&NotificationLogEntry::sent(id("J2"), "v@x.io", "Video Conversion Completed"))
            .await
            .unwrap();
        log.append(&NotificationLogEntry::sent(id("J1"), "u@x.io", "Video Conversion Failed"))
            .await
            .unwrap();

        let entries = log.list_for_job(&id("J1")).await.unwrap();
        let statuses: Vec<_> = entries.iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![DeliveryStatus::Failed, DeliveryStatus::Sent]);
        assert!(log.list_for_job(&id("J3")).await.unwrap().is_empty());
    }
}
