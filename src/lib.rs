pub mod aggregator;
pub mod analyzer;
pub mod config;
pub mod credentials;
pub mod db;
pub mod errors;
pub mod humanizer;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod redaction;
pub mod scheduler;
pub mod sections;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::orchestrator::SyncOrchestrator;
use crate::scheduler::{spawn_cron, Scheduler};
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// JSON logs to a daily rolling file under `log_dir`, or plain logs to stderr
/// when no directory is given. `RUST_LOG` overrides the `info` default.
pub fn init_tracing(log_dir: Option<&Path>) -> AppResult<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            let file_appender = tracing_appender::rolling::daily(log_dir, "sync.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = LOG_GUARD.set(guard);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_writer(non_blocking)
                .try_init()
                .map_err(|error| AppError::Config(error.to_string()))
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| AppError::Config(error.to_string())),
    }
}

/// Long-running mode: a sequential sync queue fed by the periodic cron pass.
/// Returns after ctrl-c.
pub async fn serve(config: &AppConfig) -> AppResult<()> {
    let orchestrator = Arc::new(SyncOrchestrator::from_config(config)?);
    let scheduler = Scheduler::for_orchestrator(orchestrator.clone(), config.max_queue_size);
    scheduler.start();
    let cron = spawn_cron(scheduler, orchestrator.db().clone(), config.cron_interval());
    tracing::info!(
        database = %config.database_path.display(),
        cron_interval_minutes = config.cron_interval_minutes,
        "sync service started"
    );

    tokio::signal::ctrl_c().await?;
    cron.abort();
    tracing::info!("sync service stopped");
    Ok(())
}
