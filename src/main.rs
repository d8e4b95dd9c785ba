//! AudioPipe Server: media to audio conversion pipeline
//!
//! Main entry point that wires the crates together and runs the enabled
//! queue consumers until a shutdown signal arrives.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

use audiopipe_broker::BrokerManager;
use audiopipe_core::config::AppConfig;
use audiopipe_core::error::AppError;
use audiopipe_core::traits::broker::MessageBroker;
use audiopipe_database::DatabasePool;
use audiopipe_database::repositories::{JobRepository, NotificationLogRepository};
use audiopipe_service::notification::{LogRelay, MailRelay, SmtpRelay};
use audiopipe_service::{ConversionService, NotificationService};
use audiopipe_transcoder::FfmpegTool;
use audiopipe_worker::WorkerRunner;
use audiopipe_worker::jobs::{ConversionHandler, NotificationHandler};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    match std::env::var("AUDIOPIPE_CONFIG") {
        Ok(path) => AppConfig::load_file(&path),
        Err(_) => {
            let env = std::env::var("AUDIOPIPE_ENV").unwrap_or_else(|_| "development".to_string());
            AppConfig::load(&env)
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting AudioPipe");

    // ── Step 1: Staging and output directories ───────────────────
    create_data_directories(&config).await?;

    // ── Step 2: Database connection + migrations ─────────────────
    let db_pool = DatabasePool::connect(&config.database).await?;
    audiopipe_database::migration::run_migrations(db_pool.pool()).await?;

    // ── Step 3: Broker ───────────────────────────────────────────
    tracing::info!(provider = %config.broker.provider, "Connecting to broker");
    let broker = BrokerManager::connect(&config.broker).await?;

    // ── Step 4: Repositories ─────────────────────────────────────
    let job_repo = Arc::new(JobRepository::new(db_pool.pool().clone()));
    let log_repo = Arc::new(NotificationLogRepository::new(db_pool.pool().clone()));

    // ── Step 5: Consumers ────────────────────────────────────────
    let instance = uuid::Uuid::new_v4().simple().to_string();
    let instance = &instance[..8];
    let mut runners = Vec::new();

    if config.worker.conversion_enabled {
        let service = ConversionService::new(
            job_repo.clone(),
            broker.clone(),
            Arc::new(FfmpegTool::new(config.converter.clone())),
            config.converter.clone(),
            config.storage.output_dir.clone(),
            config.broker.notification_queue.clone(),
        );
        runners.push(WorkerRunner::new(
            broker.clone(),
            Arc::new(ConversionHandler::new(service)),
            config.worker.clone(),
            config.broker.work_queue.clone(),
            format!("conversion-{instance}"),
        ));
    } else {
        tracing::info!("Conversion worker disabled");
    }

    if config.worker.notification_enabled {
        let relay: Arc<dyn MailRelay> = if config.mail.enabled {
            Arc::new(SmtpRelay::new(&config.mail)?)
        } else {
            tracing::warn!("Mail delivery disabled, notifications will only be logged");
            Arc::new(LogRelay)
        };
        let service = NotificationService::new(relay, log_repo, config.mail.templates.clone());
        runners.push(WorkerRunner::new(
            broker.clone(),
            Arc::new(NotificationHandler::new(service)),
            config.worker.clone(),
            config.broker.notification_queue.clone(),
            format!("notification-{instance}"),
        ));
    } else {
        tracing::info!("Notification worker disabled");
    }

    if runners.is_empty() {
        return Err(AppError::configuration(
            "No worker role enabled; set worker.conversion_enabled or worker.notification_enabled",
        ));
    }

    // ── Step 6: Run until shutdown or a consumer fails ───────────
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    for runner in runners {
        let cancel = cancel.clone();
        tasks.spawn(async move { runner.run(cancel).await });
    }

    let mut failure: Option<AppError> = None;
    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received, draining in-flight messages");
        }
        Some(joined) = tasks.join_next() => {
            failure = Some(task_error(joined));
        }
    }
    cancel.cancel();

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined
            .map_err(|e| AppError::internal(format!("Worker task panicked: {e}")))
            .and_then(|r| r)
        {
            tracing::error!(error = %e, "Worker stopped with error");
            failure.get_or_insert(e);
        }
    }

    // ── Step 7: Close connections ────────────────────────────────
    if let Err(e) = broker.close().await {
        tracing::warn!(error = %e, "Failed to close broker");
    }
    db_pool.close().await;

    match failure {
        Some(e) => Err(e),
        None => {
            tracing::info!("AudioPipe shut down gracefully");
            Ok(())
        }
    }
}

/// A runner that returns before shutdown is always a failure.
fn task_error(joined: Result<Result<(), AppError>, tokio::task::JoinError>) -> AppError {
    match joined {
        Ok(Ok(())) => AppError::service_unavailable("Worker stopped unexpectedly"),
        Ok(Err(e)) => e,
        Err(e) => AppError::internal(format!("Worker task panicked: {e}")),
    }
}

/// Create required data directories
async fn create_data_directories(config: &AppConfig) -> Result<(), AppError> {
    for dir in [&config.storage.upload_dir, &config.storage.output_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::storage(format!("Failed to create dir '{dir}': {e}")))?;
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
