//! CLI command definitions and dispatch.

pub mod download;
pub mod migrate;
pub mod queue;
pub mod status;
pub mod submit;
pub mod worker;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use audiopipe_broker::BrokerManager;
use audiopipe_core::config::AppConfig;
use audiopipe_core::error::AppError;
use audiopipe_database::DatabasePool;
use audiopipe_database::repositories::JobRepository;

/// AudioPipe: media to audio conversion pipeline
#[derive(Debug, Parser)]
#[command(name = "audiopipe", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit a media file for conversion
    Submit(submit::SubmitArgs),
    /// Show the status of a job
    Status(status::StatusArgs),
    /// Fetch the converted file of a completed job
    Download(download::DownloadArgs),
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Worker configuration and health
    Worker(worker::WorkerArgs),
    /// Queue maintenance
    Queue(queue::QueueArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Submit(args) => submit::execute(args, &self.config, self.format).await,
            Commands::Status(args) => status::execute(args, &self.config, self.format).await,
            Commands::Download(args) => download::execute(args, &self.config).await,
            Commands::Migrate(args) => migrate::execute(args, &self.config).await,
            Commands::Worker(args) => worker::execute(args, &self.config).await,
            Commands::Queue(args) => queue::execute(args, &self.config).await,
        }
    }
}

/// Helper: load configuration from file
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load_file(config_path)
}

/// Helper: create database pool from config
pub async fn create_db_pool(config: &AppConfig) -> Result<DatabasePool, AppError> {
    DatabasePool::connect(&config.database).await
}

/// Helper: job store backed by the configured database
pub async fn create_job_store(config: &AppConfig) -> Result<Arc<JobRepository>, AppError> {
    let pool = create_db_pool(config).await?;
    Ok(Arc::new(JobRepository::new(pool.pool().clone())))
}

/// Helper: connect to the configured broker
pub async fn connect_broker(config: &AppConfig) -> Result<BrokerManager, AppError> {
    BrokerManager::connect(&config.broker).await
}
