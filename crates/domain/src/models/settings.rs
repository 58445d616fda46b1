//! Client-side singleton settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Application-wide settings row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub default_category_id: i64,
    /// Category id to reward/punishment toggle. Missing entries are enabled.
    pub reward_punishment_toggles: BTreeMap<i64, bool>,
    pub widget_window_days: i32,
    /// First install, epoch milliseconds. Anchors the trial window.
    pub install_time: i64,
}

impl AppSettings {
    pub fn reward_punishment_enabled(&self, category_id: i64) -> bool {
        self.reward_punishment_toggles
            .get(&category_id)
            .copied()
            .unwrap_or(true)
    }
}

/// Result of the most recent backup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupOutcome {
    Success,
    Failure,
    Unchanged,
}

impl BackupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupOutcome::Success => "success",
            BackupOutcome::Failure => "failure",
            BackupOutcome::Unchanged => "unchanged",
        }
    }
}

impl FromStr for BackupOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(BackupOutcome::Success),
            "failure" => Ok(BackupOutcome::Failure),
            "unchanged" => Ok(BackupOutcome::Unchanged),
            _ => Err(format!("Invalid backup outcome: {}", s)),
        }
    }
}

impl fmt::Display for BackupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client backup schedule and last-run bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientBackupSettings {
    pub enabled: bool,
    pub backup_hour: u32,
    pub backup_minute: u32,
    pub wifi_only: bool,
    pub retention_days: i32,
    pub last_backup_time: Option<i64>,
    pub last_result: Option<BackupOutcome>,
    pub last_error: Option<String>,
}

impl Default for ClientBackupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backup_hour: 2,
            backup_minute: 0,
            wifi_only: true,
            retention_days: 90,
            last_backup_time: None,
            last_result: None,
            last_error: None,
        }
    }
}

/// Signed-in account on this device and the last known premium flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountState {
    pub user_id: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_premium: bool,
    pub premium_checked_at: Option<i64>,
}

impl AccountState {
    pub fn is_signed_in(&self) -> bool {
        self.access_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_toggle_is_enabled() {
        let mut settings = AppSettings {
            default_category_id: 5,
            reward_punishment_toggles: BTreeMap::new(),
            widget_window_days: 7,
            install_time: 0,
        };
        assert!(settings.reward_punishment_enabled(1));
        settings.reward_punishment_toggles.insert(1, false);
        assert!(!settings.reward_punishment_enabled(1));
        assert!(settings.reward_punishment_enabled(2));
    }

    #[test]
    fn test_toggles_serialize_as_map() {
        let mut toggles = BTreeMap::new();
        toggles.insert(3, false);
        let json = serde_json::to_string(&toggles).unwrap();
        assert_eq!(json, r#"{"3":false}"#);
        let back: BTreeMap<i64, bool> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, toggles);
    }

    #[test]
    fn test_outcome_strings() {
        assert_eq!(BackupOutcome::from_str("unchanged").unwrap(), BackupOutcome::Unchanged);
        assert!(BackupOutcome::from_str("partial").is_err());
    }
}
