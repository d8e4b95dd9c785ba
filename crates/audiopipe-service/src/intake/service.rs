//! Intake service: the producer end of the work queue.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{error, info, warn};

use audiopipe_broker::BrokerManager;
use audiopipe_core::config::StorageConfig;
use audiopipe_core::error::{AppError, ErrorKind};
use audiopipe_core::result::AppResult;
use audiopipe_core::types::JobId;
use audiopipe_database::store::{JobStore, StatusUpdate, TransitionOutcome};
use audiopipe_entity::job::{ConversionJob, JobStatus};
use audiopipe_entity::message::{NotificationMessage, WorkMessage};

use super::{staging, validation};
use crate::fs::remove_quietly;

/// Error text recorded when the work message cannot be enqueued.
pub const QUEUE_FAILURE: &str = "Failed to queue conversion task";

/// Accepts uploads and turns them into queued conversion jobs.
#[derive(Debug, Clone)]
pub struct IntakeService {
    jobs: Arc<dyn JobStore>,
    broker: BrokerManager,
    config: StorageConfig,
    work_queue: String,
    notification_queue: String,
}

impl IntakeService {
    /// Create a new intake service.
    pub fn new(
        jobs: Arc<dyn JobStore>,
        broker: BrokerManager,
        config: StorageConfig,
        work_queue: impl Into<String>,
        notification_queue: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            broker,
            config,
            work_queue: work_queue.into(),
            notification_queue: notification_queue.into(),
        }
    }

    /// Validate an upload before its payload is read.
    pub fn precheck(&self, file_name: &str, size: u64, user_id: &str) -> AppResult<()> {
        validation::validate_extension(file_name, &self.config)?;
        validation::validate_size(size, &self.config)?;
        validation::validate_recipient(user_id)?;
        Ok(())
    }

    /// Submit an upload for conversion and return the new job identifier.
    ///
    /// Nothing is written when validation fails. The record insert and the
    /// work publish succeed or fail together from the caller's point of view:
    /// on failure the staged file is removed and the error is returned.
    pub async fn submit(&self, file_name: &str, payload: Bytes, user_id: &str) -> AppResult<JobId> {
        self.precheck(file_name, payload.len() as u64, user_id)?;
        let user_id = user_id.trim();

        let job_id = JobId::new();
        let path = staging::staging_path(Path::new(&self.config.upload_dir), &job_id, file_name);
        staging::stage(&path, &payload).await?;
        let file_path = path.to_string_lossy().into_owned();

        let record = ConversionJob::new_processing(job_id.clone(), user_id, Some(file_path.clone()));
        if let Err(e) = self.jobs.insert_initial(&record).await {
            error!(job_id = %job_id, error = %e, "Failed to create job record");
            remove_quietly(&path).await;
            return Err(e);
        }

        let message = WorkMessage::new(job_id.clone(), file_path, user_id);
        if let Err(e) = self.broker.publish_json(&self.work_queue, &message).await {
            error!(job_id = %job_id, error = %e, "Failed to publish work message");
            self.abandon(&job_id, user_id, &path).await;
            return Err(AppError::with_source(ErrorKind::Broker, QUEUE_FAILURE, e));
        }

        info!(
            job_id = %job_id,
            user_id = %user_id,
            file = %path.display(),
            bytes = payload.len(),
            "Conversion job queued"
        );
        Ok(job_id)
    }

    /// Fail a job whose work message never reached the queue.
    ///
    /// The failure notification is published on a best-effort basis: the
    /// broker that just refused the work message may refuse it too, and the
    /// record then keeps an empty `notified_at`.
    async fn abandon(&self, job_id: &JobId, user_id: &str, path: &Path) {
        remove_quietly(path).await;

        let update = StatusUpdate::Failed {
            error: QUEUE_FAILURE.to_string(),
            attempts: 0,
        };
        match self.jobs.transition(job_id, update).await {
            Ok(TransitionOutcome::Applied) => {}
            Ok(TransitionOutcome::Noop) => return,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to mark unqueued job as failed");
                return;
            }
        }

        let message = NotificationMessage::new(
            user_id,
            job_id.clone(),
            JobStatus::Failed,
            Some(QUEUE_FAILURE.to_string()),
        );
        match self
            .broker
            .publish_json(&self.notification_queue, &message)
            .await
        {
            Ok(_) => {
                if let Err(e) = self.jobs.mark_notified(job_id).await {
                    warn!(job_id = %job_id, error = %e, "Failed to stamp notification time");
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to publish failure notification");
            }
        }
    }
}
