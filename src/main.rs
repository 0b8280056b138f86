//! Conveyor service entry point.
//!
//! Wires configuration, storage, the report generator, the delivery engine,
//! and the FIFO scheduler into the HTTP server, then runs until a shutdown
//! signal arrives.

use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use conveyor_api::{AppState, Config};
use conveyor_core::{Clock, Storage, SystemClock};
use conveyor_delivery::DeliveryEngine;
use conveyor_queue::{Admission, Scheduler};
use conveyor_report::ReportGenerator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log);

    info!(
        database_url = %config.database_url,
        addr = %format!("{}:{}", config.host, config.port),
        "starting conveyor"
    );

    let pool = open_database(&config).await?;
    let storage = Storage::new(pool.clone());
    storage.migrate().await.context("database migration failed")?;
    info!("database ready");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let generator = Arc::new(ReportGenerator::new(config.to_generator_config()));
    let engine = Arc::new(
        DeliveryEngine::new(storage.clone(), config.to_delivery_config(), clock.clone())
            .context("failed to initialize delivery engine")?,
    );
    let scheduler =
        Arc::new(Scheduler::new(storage.clone(), generator.clone(), engine, clock.clone()));
    let admission =
        Arc::new(Admission::new(storage.clone(), scheduler.clone(), generator, clock));

    let state = AppState {
        storage,
        admission,
        scheduler: scheduler.clone(),
        receiver: Arc::default(),
    };

    let addr = config.parse_server_addr()?;
    conveyor_api::serve(addr, state, shutdown_signal()).await?;

    info!("server stopped, draining worker");
    scheduler.shutdown().await;
    pool.close().await;
    info!("conveyor shutdown complete");

    Ok(())
}

fn init_tracing(filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

async fn open_database(config: &Config) -> Result<sqlx::SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .context("invalid database URL")?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to open database")
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C"),
        () = terminate => info!("received SIGTERM"),
    }
}
