//! Read-side queries over the job record store.

use std::path::PathBuf;
use std::sync::Arc;

use audiopipe_core::error::AppError;
use audiopipe_core::result::AppResult;
use audiopipe_core::types::JobId;
use audiopipe_database::store::JobStore;
use audiopipe_entity::job::{JobStatus, JobStatusView};

/// Status and download lookups.
#[derive(Debug, Clone)]
pub struct StatusService {
    jobs: Arc<dyn JobStore>,
}

impl StatusService {
    /// Create a new status service.
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    /// Current status of a job.
    pub async fn status(&self, job_id: &JobId) -> AppResult<JobStatusView> {
        let job = self
            .jobs
            .find(job_id)
            .await?
            .ok_or_else(|| AppError::not_found("Job not found"))?;
        Ok(JobStatusView::from(&job))
    }

    /// Path of the converted file of a completed job.
    pub async fn resolve_download(&self, job_id: &JobId) -> AppResult<PathBuf> {
        let job = self
            .jobs
            .find(job_id)
            .await?
            .ok_or_else(|| AppError::not_found("Job not found"))?;

        if job.status != JobStatus::Completed {
            return Err(AppError::validation("Conversion not completed"));
        }

        let path = job
            .output_path
            .map(PathBuf::from)
            .ok_or_else(|| AppError::not_found("File not found"))?;
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Ok(path),
            _ => Err(AppError::not_found("File not found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use audiopipe_core::error::ErrorKind;
    use audiopipe_database::memory::MemoryJobStore;
    use audiopipe_database::store::StatusUpdate;

    use super::*;

    async fn seeded(status: Option<StatusUpdate>) -> (StatusService, JobId) {
        let store = MemoryJobStore::new();
        let job: JobId = "J1".parse().unwrap();
        store
            .transition(
                &job,
                StatusUpdate::Processing {
                    user_id: "u@x.io".to_string(),
                    input_path: None,
                },
            )
            .await
            .unwrap();
        if let Some(update) = status {
            store.transition(&job, update).await.unwrap();
        }
        (StatusService::new(Arc::new(store)), job)
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (service, _) = seeded(None).await;
        let err = service.status(&"nope".parse().unwrap()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_download_requires_completion() {
        let (service, job) = seeded(None).await;
        let err = service.resolve_download(&job).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.message, "Conversion not completed");
    }

    #[tokio::test]
    async fn test_download_missing_file_is_not_found() {
        let (service, job) = seeded(Some(StatusUpdate::Completed {
            output_path: "/nonexistent/J1.mp3".to_string(),
            attempts: 1,
        }))
        .await;
        let err = service.resolve_download(&job).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "File not found");
    }

    #[tokio::test]
    async fn test_download_returns_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("J1.mp3");
        tokio::fs::write(&out, b"mp3").await.unwrap();
        let (service, job) = seeded(Some(StatusUpdate::Completed {
            output_path: out.to_string_lossy().into_owned(),
            attempts: 1,
        }))
        .await;
        assert_eq!(service.resolve_download(&job).await.unwrap(), out);
        assert_eq!(service.status(&job).await.unwrap().status, JobStatus::Completed);
    }
}
