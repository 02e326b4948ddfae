//! Focal background worker.
//!
//! Runs the notification queue drainer and the daily deadline scans in one
//! process, sharing a pool and shutting down together on Ctrl-C.

use anyhow::Result;
use clap::Parser;
use focal::config::AppConfig;
use focal::storage::pg::{create_pool, init_schema};
use focal::telegram::{MessageSender, TelegramSender};
use focal::worker::{run_notifier, run_reminders};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "focal-worker")]
#[command(about = "Focal notification worker and reminder scheduler")]
struct Args {
    /// Run both deadline scans immediately on startup
    #[arg(long, env = "WORKER_SCAN_ON_START")]
    scan_on_start: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("focal=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let config = AppConfig::from_env();
    config.validate()?;

    info!("Starting focal worker");
    info!("  Database: {}", config.pg.dbname);
    info!("  Queue poll: every {}s", config.worker.poll_interval_secs);
    info!(
        "  Scans: due-soon {} UTC, overdue {} UTC",
        config.worker.due_soon_at, config.worker.overdue_at
    );

    let pool = create_pool(&config.pg)?;
    init_schema(&pool).await?;
    info!("Database schema ready");

    let sender: Arc<dyn MessageSender> = Arc::new(TelegramSender::new(&config.telegram.bot_token));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let notifier = tokio::spawn(run_notifier(
        pool.clone(),
        sender,
        config.worker.clone(),
        shutdown_rx.clone(),
    ));
    let reminders = tokio::spawn(run_reminders(
        pool,
        config.worker.clone(),
        shutdown_rx,
        args.scan_on_start,
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping workers");
    if shutdown_tx.send(true).is_err() {
        warn!("worker loops already stopped");
    }

    let _ = notifier.await;
    let _ = reminders.await;

    info!("Worker stopped");
    Ok(())
}
