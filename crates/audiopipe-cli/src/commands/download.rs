//! Converted file download command.

use std::path::PathBuf;

use clap::Args;

use crate::output;
use audiopipe_core::error::AppError;
use audiopipe_core::types::JobId;
use audiopipe_service::StatusService;

/// Arguments for the download command
#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Job identifier
    pub job_id: JobId,

    /// Copy the converted file here instead of printing its path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Execute the download command
pub async fn execute(args: &DownloadArgs, config_path: &str) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let jobs = super::create_job_store(&config).await?;

    let source = StatusService::new(jobs).resolve_download(&args.job_id).await?;

    match &args.output {
        Some(dest) => {
            if tokio::fs::try_exists(dest).await.unwrap_or(false) {
                output::print_warning(&format!("Overwriting {}", dest.display()));
            }
            let bytes = tokio::fs::copy(&source, dest).await?;
            output::print_success(&format!("Saved {} ({bytes} bytes)", dest.display()));
        }
        None => println!("{}", source.display()),
    }
    Ok(())
}
