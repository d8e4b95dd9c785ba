//! Database migration commands.

use clap::{Args, Subcommand};

use crate::output;
use audiopipe_core::error::AppError;

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Migration subcommand
    #[command(subcommand)]
    pub command: MigrateCommand,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// Check database connectivity
    Check,
}

/// Execute migration commands
pub async fn execute(args: &MigrateArgs, config_path: &str) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let pool = super::create_db_pool(&config).await?;

    match &args.command {
        MigrateCommand::Run => {
            println!("Running database migrations...");
            audiopipe_database::migration::run_migrations(pool.pool()).await?;
            output::print_success("All migrations applied successfully.");
        }
        MigrateCommand::Check => {
            pool.ping().await?;
            output::print_success("Database is reachable.");
        }
    }

    pool.close().await;
    Ok(())
}
