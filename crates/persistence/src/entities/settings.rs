//! Singleton settings entities of the usage store.

use domain::models::{AccountState, AppSettings, BackupOutcome, ClientBackupSettings};
use sqlx::FromRow;
use std::str::FromStr;

/// Database row mapping for the app_settings table.
#[derive(Debug, Clone, FromRow)]
pub struct AppSettingsEntity {
    pub default_category_id: i64,
    /// JSON object of category id to bool.
    pub reward_punishment_toggles: String,
    pub widget_window_days: i32,
    pub install_time: i64,
}

impl From<AppSettingsEntity> for AppSettings {
    fn from(entity: AppSettingsEntity) -> Self {
        Self {
            default_category_id: entity.default_category_id,
            reward_punishment_toggles: serde_json::from_str(&entity.reward_punishment_toggles)
                .unwrap_or_default(),
            widget_window_days: entity.widget_window_days,
            install_time: entity.install_time,
        }
    }
}

/// Database row mapping for the backup_settings table.
#[derive(Debug, Clone, FromRow)]
pub struct ClientBackupSettingsEntity {
    pub enabled: bool,
    pub backup_hour: i64,
    pub backup_minute: i64,
    pub wifi_only: bool,
    pub retention_days: i32,
    pub last_backup_time: Option<i64>,
    pub last_result: Option<String>,
    pub last_error: Option<String>,
}

impl From<ClientBackupSettingsEntity> for ClientBackupSettings {
    fn from(entity: ClientBackupSettingsEntity) -> Self {
        Self {
            enabled: entity.enabled,
            backup_hour: entity.backup_hour.clamp(0, 23) as u32,
            backup_minute: entity.backup_minute.clamp(0, 59) as u32,
            wifi_only: entity.wifi_only,
            retention_days: entity.retention_days,
            last_backup_time: entity.last_backup_time,
            last_result: entity
                .last_result
                .as_deref()
                .and_then(|r| BackupOutcome::from_str(r).ok()),
            last_error: entity.last_error,
        }
    }
}

/// Database row mapping for the account_state table.
#[derive(Debug, Clone, FromRow)]
pub struct AccountStateEntity {
    pub user_id: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_premium: bool,
    pub premium_checked_at: Option<i64>,
}

impl From<AccountStateEntity> for AccountState {
    fn from(entity: AccountStateEntity) -> Self {
        Self {
            user_id: entity.user_id,
            access_token: entity.access_token,
            refresh_token: entity.refresh_token,
            is_premium: entity.is_premium,
            premium_checked_at: entity.premium_checked_at,
        }
    }
}
