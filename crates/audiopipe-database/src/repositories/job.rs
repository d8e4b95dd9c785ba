//! Conversion job repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use audiopipe_core::error::{AppError, ErrorKind};
use audiopipe_core::result::AppResult;
use audiopipe_core::types::JobId;
use audiopipe_entity::job::ConversionJob;

use crate::store::{JobStore, StatusUpdate, TransitionOutcome};

/// Repository for conversion job records.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    /// Create a new job repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn insert_initial(&self, job: &ConversionJob) -> AppResult<()> {
        let result = sqlx::query(
            "INSERT INTO conversion_jobs (job_id, user_id, status, input_path, created_at, updated_at) \
             VALUES ($1, $2, 'processing', $3, $4, $4) \
             ON CONFLICT (job_id) DO NOTHING",
        )
        .bind(&job.job_id)
        .bind(&job.user_id)
        .bind(&job.input_path)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create job", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::conflict(format!("Job {} already exists", job.job_id)));
        }
        Ok(())
    }

    async fn transition(&self, job_id: &JobId, update: StatusUpdate) -> AppResult<TransitionOutcome> {
        let result = match update {
            StatusUpdate::Processing {
                user_id,
                input_path,
            } => sqlx::query(
                "INSERT INTO conversion_jobs (job_id, user_id, status, input_path) \
                 VALUES ($1, $2, 'processing', $3) \
                 ON CONFLICT (job_id) DO UPDATE SET \
                    input_path = COALESCE(conversion_jobs.input_path, EXCLUDED.input_path), \
                    updated_at = NOW() \
                 WHERE conversion_jobs.status = 'processing'",
            )
            .bind(job_id)
            .bind(user_id)
            .bind(input_path)
            .execute(&self.pool)
            .await,
            StatusUpdate::Completed {
                output_path,
                attempts,
            } => sqlx::query(
                "UPDATE conversion_jobs SET status = 'completed', output_path = $2, error = NULL, \
                 attempts = $3, updated_at = NOW() \
                 WHERE job_id = $1 AND status = 'processing'",
            )
            .bind(job_id)
            .bind(output_path)
            .bind(attempts)
            .execute(&self.pool)
            .await,
            StatusUpdate::Failed { error, attempts } => sqlx::query(
                "UPDATE conversion_jobs SET status = 'failed', error = $2, output_path = NULL, \
                 attempts = $3, updated_at = NOW() \
                 WHERE job_id = $1 AND status = 'processing'",
            )
            .bind(job_id)
            .bind(error)
            .bind(attempts)
            .execute(&self.pool)
            .await,
        }
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update job status", e))?;

        Ok(if result.rows_affected() > 0 {
            TransitionOutcome::Applied
        } else {
            TransitionOutcome::Noop
        })
    }

    async fn find(&self, job_id: &JobId) -> AppResult<Option<ConversionJob>> {
        sqlx::query_as::<_, ConversionJob>(
            "SELECT job_id, user_id, status, input_path, output_path, error, attempts, \
             notified_at, created_at, updated_at \
             FROM conversion_jobs WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find job", e))
    }

    async fn mark_notified(&self, job_id: &JobId) -> AppResult<()> {
        sqlx::query(
            "UPDATE conversion_jobs SET notified_at = NOW() \
             WHERE job_id = $1 AND status <> 'processing' AND notified_at IS NULL",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to mark job notified", e))?;
        Ok(())
    }
}
