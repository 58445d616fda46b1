//! Incremental table backups: dedup by content hash, restore, preferences.

use chrono::{DateTime, NaiveDate, Utc};
use domain::models::{
    BackupPreferences, BackupRecord, BackupTable, BackupTableInfo, BackupUploadRequest,
    BackupUploadResult, UpdateBackupSettingsRequest,
};
use persistence::repositories::{BackupQuery, BackupRepository};
use serde_json::Value;
use shared::crypto::content_hash;
use sqlx::SqlitePool;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::config::BackupConfig;
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Unknown backup table: {0}")]
    UnknownTable(String),

    #[error("Too many records in one upload ({count}, max {max})")]
    TooManyRecords { count: usize, max: usize },

    #[error("Start date must not be after end date")]
    InvalidRange,

    #[error("Failed to encode backup data: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<BackupError> for ApiError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::UnknownTable(_)
            | BackupError::TooManyRecords { .. }
            | BackupError::InvalidRange => ApiError::Validation(err.to_string()),
            BackupError::Encode(e) => ApiError::Internal(format!("Backup encode: {}", e)),
            BackupError::Database(e) => e.into(),
        }
    }
}

/// Download filter. All fields optional.
#[derive(Debug, Clone, Default)]
pub struct DownloadFilter {
    pub table_name: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Everything stored for a user, for the info endpoint.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupOverview {
    pub tables: Vec<BackupTableInfo>,
    pub total_backups: i64,
    pub total_records: i64,
    pub settings: BackupPreferences,
}

pub struct BackupService<'a> {
    repo: BackupRepository,
    config: &'a BackupConfig,
}

impl<'a> BackupService<'a> {
    pub fn new(pool: SqlitePool, config: &'a BackupConfig) -> Self {
        Self {
            repo: BackupRepository::new(pool),
            config,
        }
    }

    /// Store one table's rows for one day. An identical snapshot is not rewritten.
    pub async fn upload(
        &self,
        user_id: Uuid,
        request: BackupUploadRequest,
        now: DateTime<Utc>,
    ) -> Result<BackupUploadResult, BackupError> {
        let table = parse_table(&request.table_name)?;
        let count = request.data.len();
        if count > self.config.max_records_per_upload {
            return Err(BackupError::TooManyRecords {
                count,
                max: self.config.max_records_per_upload,
            });
        }

        let data = Value::Array(request.data);
        let data_hash = content_hash(&data);

        if let Some(existing) = self
            .repo
            .find(user_id, table.as_str(), request.backup_date)
            .await?
        {
            if existing.data_hash == data_hash {
                crate::middleware::metrics::record_backup_upload(table.as_str(), true);
                return Ok(BackupUploadResult {
                    table_name: table.as_str().to_string(),
                    backup_date: request.backup_date,
                    unchanged: true,
                    data_hash,
                    record_count: existing.record_count,
                });
            }
        }

        let stored = self
            .repo
            .upsert(
                user_id,
                table.as_str(),
                request.backup_date,
                &serde_json::to_string(&data)?,
                &data_hash,
                count as i64,
                now,
            )
            .await?;

        tracing::debug!(
            user_id = %user_id,
            table = table.as_str(),
            date = %request.backup_date,
            records = count,
            "Backup stored"
        );
        crate::middleware::metrics::record_backup_upload(table.as_str(), false);

        Ok(BackupUploadResult {
            table_name: stored.table_name,
            backup_date: stored.backup_date,
            unchanged: false,
            data_hash: stored.data_hash,
            record_count: stored.record_count,
        })
    }

    /// Stored snapshots matching `filter`, oldest day first.
    pub async fn download(
        &self,
        user_id: Uuid,
        filter: &DownloadFilter,
    ) -> Result<Vec<BackupRecord>, BackupError> {
        if let Some(name) = filter.table_name.as_deref() {
            parse_table(name)?;
        }
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(BackupError::InvalidRange);
            }
        }

        let rows = self
            .repo
            .list(
                user_id,
                &BackupQuery {
                    table_name: filter.table_name.as_deref(),
                    from: filter.from,
                    to: filter.to,
                },
            )
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn overview(&self, user_id: Uuid) -> Result<BackupOverview, BackupError> {
        let tables: Vec<BackupTableInfo> = self
            .repo
            .table_stats(user_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        let settings = self.preferences(user_id).await?;

        Ok(BackupOverview {
            total_backups: tables.iter().map(|t| t.backup_count).sum(),
            total_records: tables.iter().map(|t| t.total_records).sum(),
            tables,
            settings,
        })
    }

    /// Stored preferences, or defaults with the server's retention window.
    pub async fn preferences(&self, user_id: Uuid) -> Result<BackupPreferences, BackupError> {
        Ok(match self.repo.find_settings(user_id).await? {
            Some(entity) => entity.into(),
            None => BackupPreferences {
                retention_days: self.config.default_retention_days,
                ..Default::default()
            },
        })
    }

    pub async fn update_preferences(
        &self,
        user_id: Uuid,
        update: &UpdateBackupSettingsRequest,
        now: DateTime<Utc>,
    ) -> Result<BackupPreferences, BackupError> {
        let mut prefs = self.preferences(user_id).await?;
        prefs.apply(update);
        Ok(self.repo.save_settings(user_id, &prefs, now).await?.into())
    }

    /// Delete all snapshots, or only one table's. Returns rows removed.
    pub async fn clear(&self, user_id: Uuid, table_name: Option<&str>) -> Result<u64, BackupError> {
        if let Some(name) = table_name {
            parse_table(name)?;
        }
        let deleted = self.repo.delete(user_id, table_name).await?;
        tracing::info!(user_id = %user_id, table = ?table_name, deleted, "Backups cleared");
        Ok(deleted)
    }
}

fn parse_table(name: &str) -> Result<BackupTable, BackupError> {
    BackupTable::from_str(name).map_err(|_| BackupError::UnknownTable(name.to_string()))
}
