use chrono::{FixedOffset, NaiveTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use domain::services::Backoff;

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub reminder: ReminderConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default = "default_trial_days")]
    pub trial_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the OffTimes API, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Local time of the device. Hour slots, dates and daily schedules use it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClockConfig {
    /// Minutes east of UTC, e.g. 480 for UTC+8.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl ClockConfig {
    pub fn offset(&self) -> Result<FixedOffset, ConfigValidationError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigValidationError::InvalidValue(format!(
                "UTC offset out of range: {} minutes",
                self.utc_offset_minutes
            ))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Retry policy of the daily backup. The schedule itself lives in the store.
#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_retry_initial")]
    pub retry_initial_secs: u64,

    #[serde(default = "default_retry_factor")]
    pub retry_factor: u32,

    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            retry_initial_secs: default_retry_initial(),
            retry_factor: default_retry_factor(),
            max_attempts: default_retry_attempts(),
        }
    }
}

impl BackupConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial: Duration::from_secs(self.retry_initial_secs),
            factor: self.retry_factor,
            max_attempts: self.max_attempts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Daily reminder times as `HH:MM`.
    #[serde(default = "default_reminder_times")]
    pub times: Vec<String>,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            times: default_reminder_times(),
        }
    }
}

impl ReminderConfig {
    pub fn parsed_times(&self) -> Result<Vec<NaiveTime>, ConfigValidationError> {
        self.times
            .iter()
            .map(|t| {
                shared::validation::parse_time_of_day(t).ok_or_else(|| {
                    ConfigValidationError::InvalidValue(format!("Invalid reminder time: {}", t))
                })
            })
            .collect()
    }
}

/// Device state consulted before a backup runs.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_true")]
    pub network_available: bool,

    #[serde(default = "default_true")]
    pub unmetered: bool,

    #[serde(default)]
    pub battery_low: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            network_available: true,
            unmetered: true,
            battery_low: false,
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/offtimes-tracker.db")
}
fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_request_timeout() -> u64 {
    15
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_retry_initial() -> u64 {
    30
}
fn default_retry_factor() -> u32 {
    2
}
fn default_retry_attempts() -> u32 {
    5
}
fn default_reminder_times() -> Vec<String> {
    vec!["21:00".to_string()]
}
fn default_true() -> bool {
    true
}
fn default_trial_days() -> i64 {
    domain::services::TRIAL_DAYS
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl TrackerConfig {
    /// Load configuration.
    ///
    /// Loading order (later sources override earlier):
    /// 1. the TOML file at `path` (optional)
    /// 2. Environment variables with OFFTIMES_TRACKER__ prefix
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("OFFTIMES_TRACKER")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("reminder.times")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Defaults plus overrides, without touching files or the environment.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }
        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.clock.offset()?;
        self.reminder.parsed_times()?;

        if !self.server.base_url.starts_with("http://") && !self.server.base_url.starts_with("https://")
        {
            return Err(ConfigValidationError::InvalidValue(format!(
                "Server URL must be http(s): {}",
                self.server.base_url
            )));
        }

        if self.backup.max_attempts == 0 || self.backup.retry_factor == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Backup retry needs at least one attempt and a factor of 1 or more".to_string(),
            ));
        }

        if self.trial_days <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Trial days must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::load_for_test(&[]).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.path, PathBuf::from("data/offtimes-tracker.db"));
        assert_eq!(config.trial_days, 7);
        assert_eq!(config.backup.backoff(), Backoff::default());
        assert_eq!(
            config.reminder.parsed_times().unwrap(),
            vec![NaiveTime::from_hms_opt(21, 0, 0).unwrap()]
        );
    }

    #[test]
    fn test_offset() {
        let config = TrackerConfig::load_for_test(&[("clock.utc_offset_minutes", "480")]).unwrap();
        assert_eq!(config.clock.offset().unwrap().local_minus_utc(), 8 * 3600);

        let config = TrackerConfig::load_for_test(&[("clock.utc_offset_minutes", "2000")]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_reminder_time() {
        let mut config = TrackerConfig::load_for_test(&[]).unwrap();
        config.reminder.times = vec!["24:30".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_url() {
        let config =
            TrackerConfig::load_for_test(&[("server.base_url", "ftp://example.com")]).unwrap();
        assert!(config.validate().is_err());
    }
}
