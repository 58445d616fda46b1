use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use offtimes_api::app::{create_app, AppState};
use offtimes_api::config::Config;
use offtimes_api::jobs::{AuthCleanupJob, BackupRetentionJob, JobScheduler, PoolMetricsJob};
use offtimes_api::middleware::{init_logging, init_metrics};
use offtimes_api::services::sender_for;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;

    init_logging(&config.logging).context("Failed to initialize logging")?;
    init_metrics().context("Failed to install metrics recorder")?;

    info!("Starting OffTimes server v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&(&config.database).into()).await?;

    info!("Running database migrations...");
    persistence::db::run_server_migrations(&pool).await?;
    info!("Migrations completed");

    let sms_sender = sender_for(&config.sms).map_err(anyhow::Error::msg)?;

    let mut scheduler = JobScheduler::new();
    scheduler.register(PoolMetricsJob::new(pool.clone()));
    scheduler.register(AuthCleanupJob::new(pool.clone(), config.auth.trial_days));
    scheduler.register(BackupRetentionJob::new(
        pool.clone(),
        config.backup.default_retention_days,
    ));
    scheduler.start();

    let addr = config.socket_addr();
    let state = AppState::new(config, pool, sms_sender).context("Invalid JWT configuration")?;
    let app = create_app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    scheduler.stop(Duration::from_secs(10)).await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
