//! Database connection pool management.

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Schema of the auth/backup server.
pub static SERVER_MIGRATOR: Migrator = sqlx::migrate!("src/migrations/server");

/// Schema of the on-device usage store.
pub static TRACKER_MIGRATOR: Migrator = sqlx::migrate!("src/migrations/tracker");

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Configuration for a file-backed database at `path`.
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self {
            url: format!("sqlite://{}", path.as_ref().display()),
            max_connections: 5,
            min_connections: 1,
            connect_timeout_secs: 10,
            idle_timeout_secs: 600,
        }
    }
}

/// Creates a SQLite connection pool with the given configuration.
///
/// The file is created if missing, WAL journaling and foreign keys are on.
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let filename = options.clone().get_filename();
    if let Some(parent) = filename.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            info!("Created database directory: {}", parent.display());
        }
    }

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect_with(options)
        .await
}

/// Creates a private in-memory database.
///
/// The pool holds a single connection that never expires, so the database
/// lives as long as the pool.
pub async fn create_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

/// Applies the server schema.
pub async fn run_server_migrations(pool: &SqlitePool) -> Result<(), MigrateError> {
    info!("Running server database migrations");
    SERVER_MIGRATOR.run(pool).await?;
    info!("Server migrations completed");
    Ok(())
}

/// Applies the usage store schema.
pub async fn run_tracker_migrations(pool: &SqlitePool) -> Result<(), MigrateError> {
    info!("Running tracker database migrations");
    TRACKER_MIGRATOR.run(pool).await?;
    info!("Tracker migrations completed");
    Ok(())
}
