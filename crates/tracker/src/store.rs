//! The on-device usage store.

use chrono::{DateTime, Utc};
use domain::models::AppSettings;
use persistence::db::{create_memory_pool, create_pool, run_tracker_migrations, DatabaseConfig};
use persistence::repositories::CategoryRepository;
use persistence::repositories::SettingsRepository;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

use crate::error::Result;

/// Category new apps land in until the user moves them.
pub const FALLBACK_CATEGORY: &str = "Other";

/// Open (or create) the store at `path` and bring its schema up to date.
pub async fn open(path: &Path, now: DateTime<Utc>) -> Result<SqlitePool> {
    let pool = create_pool(&DatabaseConfig::for_path(path)).await?;
    prepare(&pool, now).await?;
    info!(path = %path.display(), "Usage store opened");
    Ok(pool)
}

/// A throwaway in-memory store.
pub async fn open_in_memory(now: DateTime<Utc>) -> Result<SqlitePool> {
    let pool = create_memory_pool().await?;
    prepare(&pool, now).await?;
    Ok(pool)
}

async fn prepare(pool: &SqlitePool, now: DateTime<Utc>) -> Result<AppSettings> {
    run_tracker_migrations(pool).await?;

    let categories = CategoryRepository::new(pool.clone());
    let default_category = match categories.find_by_name(FALLBACK_CATEGORY).await? {
        Some(category) => category,
        None => categories.create(FALLBACK_CATEGORY).await?,
    };

    // The first open fixes the install time; the trial window hangs off it
    let settings = SettingsRepository::new(pool.clone())
        .ensure_app_settings(now.timestamp_millis(), default_category.id)
        .await?;
    Ok(settings)
}
