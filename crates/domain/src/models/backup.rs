//! Incremental backup domain models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Client tables included in the daily backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupTable {
    AppSessions,
    TimerSessions,
    SummaryUsageDay,
    RewardPunishmentDay,
}

impl BackupTable {
    pub const ALL: [BackupTable; 4] = [
        BackupTable::AppSessions,
        BackupTable::TimerSessions,
        BackupTable::SummaryUsageDay,
        BackupTable::RewardPunishmentDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupTable::AppSessions => "app_sessions",
            BackupTable::TimerSessions => "timer_sessions",
            BackupTable::SummaryUsageDay => "summary_usage_day",
            BackupTable::RewardPunishmentDay => "reward_punishment_day",
        }
    }
}

impl FromStr for BackupTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackupTable::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown backup table: {}", s))
    }
}

impl fmt::Display for BackupTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn validate_table_name(name: &str) -> Result<(), ValidationError> {
    BackupTable::from_str(name).map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("backup_table");
        err.message = Some("Unknown backup table".into());
        err
    })
}

/// One stored snapshot of a client table for a single day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub table_name: String,
    pub backup_date: NaiveDate,
    pub data: JsonValue,
    pub data_hash: String,
    pub record_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to upload one table's rows for one day.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BackupUploadRequest {
    #[validate(custom(function = "validate_table_name"))]
    pub table_name: String,
    pub backup_date: NaiveDate,
    pub data: Vec<JsonValue>,
}

/// Result of an upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupUploadResult {
    pub table_name: String,
    pub backup_date: NaiveDate,
    /// True when the stored snapshot already had the same content hash.
    pub unchanged: bool,
    pub data_hash: String,
    pub record_count: i64,
}

/// Per-table backup statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupTableInfo {
    pub table_name: String,
    pub backup_count: i64,
    pub total_records: i64,
    pub last_backup_date: Option<NaiveDate>,
    pub last_uploaded_at: Option<DateTime<Utc>>,
}

/// A user's server-side backup preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupPreferences {
    pub enabled: bool,
    pub retention_days: i32,
    pub wifi_only: bool,
    pub backup_time: String,
}

pub const DEFAULT_RETENTION_DAYS: i32 = 90;
pub const DEFAULT_BACKUP_TIME: &str = "02:00";

impl Default for BackupPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: DEFAULT_RETENTION_DAYS,
            wifi_only: true,
            backup_time: DEFAULT_BACKUP_TIME.to_string(),
        }
    }
}

/// Partial update of backup preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBackupSettingsRequest {
    pub enabled: Option<bool>,
    #[validate(range(min = 1, max = 3650, message = "Retention must be 1-3650 days"))]
    pub retention_days: Option<i32>,
    pub wifi_only: Option<bool>,
    #[validate(custom(function = "shared::validation::validate_time_of_day"))]
    pub backup_time: Option<String>,
}

impl BackupPreferences {
    /// Applies the fields present in `update`.
    pub fn apply(&mut self, update: &UpdateBackupSettingsRequest) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(days) = update.retention_days {
            self.retention_days = days;
        }
        if let Some(wifi_only) = update.wifi_only {
            self.wifi_only = wifi_only;
        }
        if let Some(time) = &update.backup_time {
            self.backup_time = time.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_names() {
        for table in BackupTable::ALL {
            assert_eq!(BackupTable::from_str(table.as_str()).unwrap(), table);
        }
        assert!(BackupTable::from_str("users").is_err());
    }

    #[test]
    fn test_upload_request_validation() {
        let req: BackupUploadRequest = serde_json::from_value(json!({
            "tableName": "app_sessions",
            "backupDate": "2024-03-01",
            "data": [{"id": 1}]
        }))
        .unwrap();
        assert!(req.validate().is_ok());

        let bad = BackupUploadRequest {
            table_name: "users".to_string(),
            ..req
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_upload_request_rejects_bad_date() {
        let result: Result<BackupUploadRequest, _> = serde_json::from_value(json!({
            "tableName": "app_sessions",
            "backupDate": "2024-13-01",
            "data": []
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_settings_update_validation() {
        let ok = UpdateBackupSettingsRequest {
            retention_days: Some(30),
            backup_time: Some("03:15".to_string()),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let bad_time = UpdateBackupSettingsRequest {
            backup_time: Some("25:00".to_string()),
            ..Default::default()
        };
        assert!(bad_time.validate().is_err());

        let bad_days = UpdateBackupSettingsRequest {
            retention_days: Some(0),
            ..Default::default()
        };
        assert!(bad_days.validate().is_err());
    }

    #[test]
    fn test_preferences_apply_partial() {
        let mut prefs = BackupPreferences::default();
        prefs.apply(&UpdateBackupSettingsRequest {
            wifi_only: Some(false),
            ..Default::default()
        });
        assert!(!prefs.wifi_only);
        assert!(prefs.enabled);
        assert_eq!(prefs.retention_days, DEFAULT_RETENTION_DAYS);
        assert_eq!(prefs.backup_time, DEFAULT_BACKUP_TIME);
    }
}
