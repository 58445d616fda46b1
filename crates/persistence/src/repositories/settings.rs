//! Singleton settings rows of the usage store.

use chrono::NaiveDate;
use domain::models::{AccountState, AppSettings, BackupOutcome, ClientBackupSettings};
use sqlx::SqlitePool;

use crate::entities::{AccountStateEntity, AppSettingsEntity, ClientBackupSettingsEntity};
use crate::metrics::QueryTimer;

const BACKUP_SETTINGS_COLUMNS: &str = r#"
    enabled, backup_hour, backup_minute, wifi_only, retention_days,
    last_backup_time, last_result, last_error
"#;

/// Repository for app, backup and account settings.
#[derive(Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the app settings row on first start. Later calls keep the
    /// original install time.
    pub async fn ensure_app_settings(
        &self,
        install_time: i64,
        default_category_id: i64,
    ) -> Result<AppSettings, sqlx::Error> {
        let timer = QueryTimer::new("ensure_app_settings");
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO app_settings (id, default_category_id, install_time)
            VALUES (1, ?1, ?2)
            "#,
        )
        .bind(default_category_id)
        .bind(install_time)
        .execute(&self.pool)
        .await?;
        timer.record();
        self.app_settings().await
    }

    pub async fn app_settings(&self) -> Result<AppSettings, sqlx::Error> {
        let timer = QueryTimer::new("get_app_settings");
        let result = sqlx::query_as::<_, AppSettingsEntity>(
            r#"
            SELECT default_category_id, reward_punishment_toggles, widget_window_days, install_time
            FROM app_settings
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result.map(Into::into)
    }

    pub async fn set_reward_punishment_enabled(
        &self,
        category_id: i64,
        enabled: bool,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("set_reward_punishment_toggle");
        let result = sqlx::query(
            r#"
            UPDATE app_settings
            SET reward_punishment_toggles = json_set(reward_punishment_toggles, '$."' || ?1 || '"', json(?2))
            WHERE id = 1
            "#,
        )
        .bind(category_id.to_string())
        .bind(if enabled { "true" } else { "false" })
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    pub async fn set_default_category(&self, category_id: i64) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("set_default_category");
        let result = sqlx::query("UPDATE app_settings SET default_category_id = ?1 WHERE id = 1")
            .bind(category_id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|_| ())
    }

    pub async fn set_widget_window(&self, days: i32) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("set_widget_window");
        let result = sqlx::query("UPDATE app_settings SET widget_window_days = ?1 WHERE id = 1")
            .bind(days)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|_| ())
    }

    /// Local date on which past days were last brought up to date.
    pub async fn last_rollover(&self) -> Result<Option<NaiveDate>, sqlx::Error> {
        let timer = QueryTimer::new("get_last_rollover");
        let result = sqlx::query_scalar::<_, Option<NaiveDate>>(
            "SELECT last_rollover_date FROM app_settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result.map(Option::flatten)
    }

    pub async fn set_last_rollover(&self, date: NaiveDate) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("set_last_rollover");
        let result = sqlx::query("UPDATE app_settings SET last_rollover_date = ?1 WHERE id = 1")
            .bind(date)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|_| ())
    }

    // ------------------------------------------------------------------
    // Backup settings
    // ------------------------------------------------------------------

    pub async fn backup_settings(&self) -> Result<ClientBackupSettings, sqlx::Error> {
        let timer = QueryTimer::new("get_client_backup_settings");
        let sql = format!(
            "SELECT {} FROM backup_settings WHERE id = 1",
            BACKUP_SETTINGS_COLUMNS
        );
        let result = sqlx::query_as::<_, ClientBackupSettingsEntity>(&sql)
            .fetch_one(&self.pool)
            .await;
        timer.record();
        result.map(Into::into)
    }

    /// Persist the user-editable part of the backup settings.
    pub async fn save_backup_schedule(
        &self,
        settings: &ClientBackupSettings,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("save_client_backup_schedule");
        let result = sqlx::query(
            r#"
            UPDATE backup_settings
            SET enabled = ?1, backup_hour = ?2, backup_minute = ?3, wifi_only = ?4,
                retention_days = ?5
            WHERE id = 1
            "#,
        )
        .bind(settings.enabled)
        .bind(settings.backup_hour as i64)
        .bind(settings.backup_minute as i64)
        .bind(settings.wifi_only)
        .bind(settings.retention_days)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    /// Record the outcome of a backup run.
    ///
    /// The last backup time only moves on success or unchanged.
    pub async fn record_backup_result(
        &self,
        outcome: BackupOutcome,
        error: Option<&str>,
        at_ms: i64,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("record_backup_result");
        let result = sqlx::query(
            r#"
            UPDATE backup_settings
            SET last_result = ?1,
                last_error = ?2,
                last_backup_time = CASE WHEN ?1 = 'failure' THEN last_backup_time ELSE ?3 END
            WHERE id = 1
            "#,
        )
        .bind(outcome.as_str())
        .bind(error)
        .bind(at_ms)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    // ------------------------------------------------------------------
    // Account state
    // ------------------------------------------------------------------

    pub async fn account_state(&self) -> Result<AccountState, sqlx::Error> {
        let timer = QueryTimer::new("get_account_state");
        let result = sqlx::query_as::<_, AccountStateEntity>(
            r#"
            SELECT user_id, access_token, refresh_token, is_premium, premium_checked_at
            FROM account_state
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result.map(Into::into)
    }

    /// Store the tokens of a signed-in user.
    pub async fn save_tokens(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("save_account_tokens");
        let result = sqlx::query(
            r#"
            UPDATE account_state
            SET user_id = ?1, access_token = ?2, refresh_token = ?3
            WHERE id = 1
            "#,
        )
        .bind(user_id)
        .bind(access_token)
        .bind(refresh_token)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    pub async fn cache_premium(&self, is_premium: bool, checked_at_ms: i64) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("cache_premium");
        let result = sqlx::query(
            "UPDATE account_state SET is_premium = ?1, premium_checked_at = ?2 WHERE id = 1",
        )
        .bind(is_premium)
        .bind(checked_at_ms)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    /// Forget the signed-in account. The cached entitlement goes with it.
    pub async fn clear_account(&self) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("clear_account_state");
        let result = sqlx::query(
            r#"
            UPDATE account_state
            SET user_id = NULL, access_token = NULL, refresh_token = NULL,
                is_premium = 0, premium_checked_at = NULL
            WHERE id = 1
            "#,
        )
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }
}
