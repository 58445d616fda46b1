//! Backup snapshot entities.

use chrono::{DateTime, NaiveDate, Utc};
use domain::models::BackupPreferences;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the backups table.
#[derive(Debug, Clone, FromRow)]
pub struct BackupEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub table_name: String,
    pub backup_date: NaiveDate,
    /// Rows as a JSON array string.
    pub data: String,
    pub data_hash: String,
    pub record_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BackupEntity> for domain::models::BackupRecord {
    fn from(entity: BackupEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            table_name: entity.table_name,
            backup_date: entity.backup_date,
            data: serde_json::from_str(&entity.data).unwrap_or(serde_json::Value::Null),
            data_hash: entity.data_hash,
            record_count: entity.record_count,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

/// Aggregated statistics for one table of one user.
#[derive(Debug, Clone, FromRow)]
pub struct BackupTableStatsEntity {
    pub table_name: String,
    pub backup_count: i64,
    pub total_records: i64,
    pub last_backup_date: Option<NaiveDate>,
    pub last_uploaded_at: Option<DateTime<Utc>>,
}

impl From<BackupTableStatsEntity> for domain::models::BackupTableInfo {
    fn from(entity: BackupTableStatsEntity) -> Self {
        Self {
            table_name: entity.table_name,
            backup_count: entity.backup_count,
            total_records: entity.total_records,
            last_backup_date: entity.last_backup_date,
            last_uploaded_at: entity.last_uploaded_at,
        }
    }
}

/// Database row mapping for the backup_settings table.
#[derive(Debug, Clone, FromRow)]
pub struct BackupSettingsEntity {
    pub user_id: Uuid,
    pub enabled: bool,
    pub retention_days: i32,
    pub wifi_only: bool,
    pub backup_time: String,
    pub updated_at: DateTime<Utc>,
}

impl From<BackupSettingsEntity> for BackupPreferences {
    fn from(entity: BackupSettingsEntity) -> Self {
        Self {
            enabled: entity.enabled,
            retention_days: entity.retention_days,
            wifi_only: entity.wifi_only,
            backup_time: entity.backup_time,
        }
    }
}
