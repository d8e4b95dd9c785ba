//! Job status command.

use std::sync::Arc;

use clap::Args;

use crate::output::{self, OutputFormat};
use audiopipe_core::error::AppError;
use audiopipe_core::types::JobId;
use audiopipe_database::repositories::{JobRepository, NotificationLogRepository};
use audiopipe_database::store::NotificationLogStore;
use audiopipe_service::StatusService;

/// Arguments for the status command
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Job identifier
    pub job_id: JobId,

    /// Also list notification delivery attempts
    #[arg(long)]
    pub history: bool,
}

/// Execute the status command
pub async fn execute(args: &StatusArgs, config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let pool = super::create_db_pool(&config).await?;
    let jobs = Arc::new(JobRepository::new(pool.pool().clone()));

    let view = StatusService::new(jobs).status(&args.job_id).await?;
    if !args.history {
        output::print_item(&view, format);
        return Ok(());
    }

    let deliveries = NotificationLogRepository::new(pool.pool().clone())
        .list_for_job(&args.job_id)
        .await?;
    match format {
        OutputFormat::Json => output::print_item(
            &serde_json::json!({ "job": view, "notifications": deliveries }),
            format,
        ),
        OutputFormat::Text => {
            output::print_item(&view, format);
            println!();
            if deliveries.is_empty() {
                output::print_warning("No notification delivery recorded");
            }
            for entry in &deliveries {
                let detail = match &entry.error {
                    Some(error) => format!("{:?} to {} ({error})", entry.status, entry.email),
                    None => format!("{:?} to {}", entry.status, entry.email),
                };
                output::print_kv(&entry.timestamp.to_rfc3339(), &detail);
            }
        }
    }
    Ok(())
}
