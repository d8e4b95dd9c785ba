//! Schema migrations for `conversion_jobs` and `notification_log`.
//!
//! The SQL files under the workspace `migrations/` directory are embedded at
//! build time, so a deployed binary carries its own schema.

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use tracing::info;

use audiopipe_core::error::{AppError, ErrorKind};

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Bring the job store schema up to date. Applied migrations are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    info!(embedded = MIGRATOR.iter().count(), "Applying job store migrations");

    MIGRATOR.run(pool).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Database,
            format!("Job store migration failed: {e}"),
            e,
        )
    })?;

    info!("Job store schema is up to date");
    Ok(())
}
