//! Queue maintenance commands.

use std::sync::Arc;

use clap::{Args, Subcommand};

use crate::output;
use audiopipe_core::error::AppError;
use audiopipe_core::traits::broker::MessageBroker;
use audiopipe_core::types::JobId;
use audiopipe_database::store::JobStore;
use audiopipe_entity::message::WorkMessage;

/// Arguments for queue commands
#[derive(Debug, Args)]
pub struct QueueArgs {
    /// Queue subcommand
    #[command(subcommand)]
    pub command: QueueCommand,
}

/// Queue subcommands
#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// Check broker connectivity
    Health,
    /// Publish the work message of a job that is still processing again
    Resend {
        /// Job identifier
        job_id: JobId,
    },
}

/// Execute queue commands
pub async fn execute(args: &QueueArgs, config_path: &str) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let broker = super::connect_broker(&config).await?;

    match &args.command {
        QueueCommand::Health => {
            if broker.health_check().await? {
                output::print_success(&format!("Broker '{}' is reachable.", config.broker.provider));
            } else {
                return Err(AppError::broker("Broker health check failed"));
            }
        }
        QueueCommand::Resend { job_id } => {
            let jobs: Arc<dyn JobStore> = super::create_job_store(&config).await?;
            let job = jobs
                .find(job_id)
                .await?
                .ok_or_else(|| AppError::not_found("Job not found"))?;

            if job.is_terminal() {
                return Err(AppError::conflict(format!("Job {job_id} is already {}", job.status)));
            }
            let file_path = job
                .input_path
                .ok_or_else(|| AppError::validation(format!("Job {job_id} has no staged input")))?;

            let message = WorkMessage::new(job.job_id, file_path, job.user_id);
            let id = broker.publish_json(&config.broker.work_queue, &message).await?;
            output::print_success(&format!("Work message for {job_id} published ({id})"));
        }
    }

    broker.close().await?;
    Ok(())
}
