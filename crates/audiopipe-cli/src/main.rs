//! `audiopipe` operator CLI: submit uploads, inspect jobs and downloads,
//! manage the job store schema and check the queues.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use audiopipe_core::error::{AppError, ErrorKind};

mod commands;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // Diagnostics go to stderr so `--format json` output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match Cli::parse().execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&e.to_string());
            ExitCode::from(exit_status(&e))
        }
    }
}

/// 2 for an unknown job or file, 3 when the store or broker is unreachable.
fn exit_status(err: &AppError) -> u8 {
    match err.kind {
        ErrorKind::NotFound => 2,
        _ if err.is_transient() => 3,
        _ => 1,
    }
}
