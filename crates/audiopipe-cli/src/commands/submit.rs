//! Upload submission command.

use std::path::PathBuf;

use bytes::Bytes;
use clap::Args;
use serde::Serialize;

use crate::output::{self, OutputFormat};
use audiopipe_core::error::AppError;
use audiopipe_service::IntakeService;

/// Arguments for the submit command
#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// Media file to convert
    pub file: PathBuf,

    /// Owning user's email address; receives the status notifications
    #[arg(short, long)]
    pub user: String,

    /// File name to record instead of the local one
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
struct Submitted {
    job_id: String,
    status: &'static str,
}

/// Execute the submit command
pub async fn execute(args: &SubmitArgs, config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;

    let file_name = match &args.name {
        Some(name) => name.clone(),
        None => args
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::validation("File path has no file name"))?,
    };

    let jobs = super::create_job_store(&config).await?;
    let broker = super::connect_broker(&config).await?;
    let intake = IntakeService::new(
        jobs,
        broker,
        config.storage.clone(),
        config.broker.work_queue.clone(),
        config.broker.notification_queue.clone(),
    );

    let size = tokio::fs::metadata(&args.file).await?.len();
    intake.precheck(&file_name, size, &args.user)?;
    let payload = tokio::fs::read(&args.file).await?;

    let job_id = intake.submit(&file_name, Bytes::from(payload), &args.user).await?;

    match format {
        OutputFormat::Text => output::print_success(&format!("Job {job_id} queued")),
        OutputFormat::Json => output::print_item(
            &Submitted {
                job_id: job_id.into_string(),
                status: "processing",
            },
            format,
        ),
    }
    Ok(())
}
