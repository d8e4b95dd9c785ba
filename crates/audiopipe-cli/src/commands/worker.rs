//! Worker inspection commands.

use clap::{Args, Subcommand};

use crate::output;
use audiopipe_core::error::AppError;
use audiopipe_core::traits::broker::MessageBroker;

/// Arguments for worker commands
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Worker subcommand
    #[command(subcommand)]
    pub command: WorkerCommand,
}

/// Worker subcommands
#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Show worker configuration and dependency health
    Status,
}

/// Execute worker commands
pub async fn execute(args: &WorkerArgs, config_path: &str) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;

    match &args.command {
        WorkerCommand::Status => {
            println!("Worker Status:");
            output::print_kv("Concurrency", &config.worker.concurrency.to_string());
            output::print_kv("Conversion Enabled", &config.worker.conversion_enabled.to_string());
            output::print_kv("Notification Enabled", &config.worker.notification_enabled.to_string());
            output::print_kv("Work Queue", &config.broker.work_queue);
            output::print_kv("Notification Queue", &config.broker.notification_queue);
            output::print_kv("Broker", &config.broker.provider);

            let database_ok = match super::create_db_pool(&config).await {
                Ok(pool) => pool.ping().await.is_ok(),
                Err(_) => false,
            };
            let broker_ok = match super::connect_broker(&config).await {
                Ok(broker) => broker.health_check().await.unwrap_or(false),
                Err(_) => false,
            };
            output::print_kv("Database", if database_ok { "up" } else { "down" });
            output::print_kv("Broker Health", if broker_ok { "up" } else { "down" });

            if !config.mail.enabled {
                output::print_warning("Mail delivery is disabled; notifications are only logged.");
            }
        }
    }

    Ok(())
}
