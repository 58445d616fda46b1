//! Backup repository: per-user table snapshots and backup preferences.

use chrono::{DateTime, NaiveDate, Utc};
use domain::models::BackupPreferences;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::entities::{BackupEntity, BackupSettingsEntity, BackupTableStatsEntity};
use crate::metrics::QueryTimer;

const BACKUP_COLUMNS: &str =
    "id, user_id, table_name, backup_date, data, data_hash, record_count, created_at, updated_at";

/// Filter for listing stored backups.
#[derive(Debug, Clone, Default)]
pub struct BackupQuery<'a> {
    pub table_name: Option<&'a str>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Repository for backup snapshots.
#[derive(Clone)]
pub struct BackupRepository {
    pool: SqlitePool,
}

impl BackupRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Find the snapshot of one table for one day.
    pub async fn find(
        &self,
        user_id: Uuid,
        table_name: &str,
        backup_date: NaiveDate,
    ) -> Result<Option<BackupEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_backup");
        let sql = format!(
            "SELECT {} FROM backups WHERE user_id = ?1 AND table_name = ?2 AND backup_date = ?3",
            BACKUP_COLUMNS
        );
        let result = sqlx::query_as::<_, BackupEntity>(&sql)
            .bind(user_id)
            .bind(table_name)
            .bind(backup_date)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Insert or replace the snapshot for `(user, table, date)`.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        user_id: Uuid,
        table_name: &str,
        backup_date: NaiveDate,
        data: &str,
        data_hash: &str,
        record_count: i64,
        now: DateTime<Utc>,
    ) -> Result<BackupEntity, sqlx::Error> {
        let timer = QueryTimer::new("upsert_backup");
        let sql = format!(
            r#"
            INSERT INTO backups (id, user_id, table_name, backup_date, data, data_hash,
                                 record_count, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT (user_id, table_name, backup_date) DO UPDATE SET
                data = excluded.data,
                data_hash = excluded.data_hash,
                record_count = excluded.record_count,
                updated_at = excluded.updated_at
            RETURNING {}
            "#,
            BACKUP_COLUMNS
        );
        let result = sqlx::query_as::<_, BackupEntity>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(table_name)
            .bind(backup_date)
            .bind(data)
            .bind(data_hash)
            .bind(record_count)
            .bind(now)
            .fetch_one(&self.pool)
            .await;
        timer.record();
        result
    }

    /// List snapshots, oldest day first.
    pub async fn list(
        &self,
        user_id: Uuid,
        query: &BackupQuery<'_>,
    ) -> Result<Vec<BackupEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_backups");
        let sql = format!(
            r#"
            SELECT {}
            FROM backups
            WHERE user_id = ?1
              AND (?2 IS NULL OR table_name = ?2)
              AND (?3 IS NULL OR backup_date >= ?3)
              AND (?4 IS NULL OR backup_date <= ?4)
            ORDER BY backup_date ASC, table_name ASC
            "#,
            BACKUP_COLUMNS
        );
        let result = sqlx::query_as::<_, BackupEntity>(&sql)
            .bind(user_id)
            .bind(query.table_name)
            .bind(query.from)
            .bind(query.to)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Per-table counts for a user.
    pub async fn table_stats(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<BackupTableStatsEntity>, sqlx::Error> {
        let timer = QueryTimer::new("backup_table_stats");
        let result = sqlx::query_as::<_, BackupTableStatsEntity>(
            r#"
            SELECT table_name,
                   COUNT(*) AS backup_count,
                   COALESCE(SUM(record_count), 0) AS total_records,
                   MAX(backup_date) AS last_backup_date,
                   MAX(updated_at) AS last_uploaded_at
            FROM backups
            WHERE user_id = ?1
            GROUP BY table_name
            ORDER BY table_name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Delete a user's snapshots, optionally only those of one table.
    pub async fn delete(&self, user_id: Uuid, table_name: Option<&str>) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_backups");
        let result = sqlx::query("DELETE FROM backups WHERE user_id = ?1 AND (?2 IS NULL OR table_name = ?2)")
            .bind(user_id)
            .bind(table_name)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|r| r.rows_affected())
    }

    /// Delete snapshots older than each user's retention window, counted
    /// back from `today`. Users without settings use `default_retention_days`.
    pub async fn purge_expired(
        &self,
        today: NaiveDate,
        default_retention_days: i32,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("purge_expired_backups");
        let result = sqlx::query(
            r#"
            DELETE FROM backups
            WHERE backup_date < date(
                ?1,
                '-' || COALESCE(
                    (SELECT s.retention_days FROM backup_settings s WHERE s.user_id = backups.user_id),
                    ?2
                ) || ' days'
            )
            "#,
        )
        .bind(today)
        .bind(default_retention_days)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected())
    }

    // ------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------

    pub async fn find_settings(
        &self,
        user_id: Uuid,
    ) -> Result<Option<BackupSettingsEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_backup_settings");
        let result = sqlx::query_as::<_, BackupSettingsEntity>(
            r#"
            SELECT user_id, enabled, retention_days, wifi_only, backup_time, updated_at
            FROM backup_settings
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn save_settings(
        &self,
        user_id: Uuid,
        prefs: &BackupPreferences,
        now: DateTime<Utc>,
    ) -> Result<BackupSettingsEntity, sqlx::Error> {
        let timer = QueryTimer::new("save_backup_settings");
        let result = sqlx::query_as::<_, BackupSettingsEntity>(
            r#"
            INSERT INTO backup_settings (user_id, enabled, retention_days, wifi_only, backup_time, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (user_id) DO UPDATE SET
                enabled = excluded.enabled,
                retention_days = excluded.retention_days,
                wifi_only = excluded.wifi_only,
                backup_time = excluded.backup_time,
                updated_at = excluded.updated_at
            RETURNING user_id, enabled, retention_days, wifi_only, backup_time, updated_at
            "#,
        )
        .bind(user_id)
        .bind(prefs.enabled)
        .bind(prefs.retention_days)
        .bind(prefs.wifi_only)
        .bind(&prefs.backup_time)
        .bind(now)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, run_server_migrations};
    use crate::repositories::user::{NewUser, UserRepository};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn setup() -> (BackupRepository, Uuid) {
        let pool = create_memory_pool().await.unwrap();
        run_server_migrations(&pool).await.unwrap();
        let user = UserRepository::new(pool.clone())
            .create_user(&NewUser::default(), Utc::now())
            .await
            .unwrap();
        (BackupRepository::new(pool), user.id)
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_day() {
        let (repo, user) = setup().await;
        let d = date(2024, 3, 1);
        let first = repo
            .upsert(user, "app_sessions", d, "[1]", "h1", 1, Utc::now())
            .await
            .unwrap();
        let second = repo
            .upsert(user, "app_sessions", d, "[1,2]", "h2", 2, Utc::now())
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.data_hash, "h2");
        assert_eq!(second.record_count, 2);

        let all = repo.list(user, &BackupQuery::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (repo, user) = setup().await;
        for day in 1..=5 {
            repo.upsert(user, "app_sessions", date(2024, 3, day), "[]", "h", 0, Utc::now())
                .await
                .unwrap();
        }
        repo.upsert(user, "timer_sessions", date(2024, 3, 2), "[]", "h", 0, Utc::now())
            .await
            .unwrap();

        let filtered = repo
            .list(
                user,
                &BackupQuery {
                    table_name: Some("app_sessions"),
                    from: Some(date(2024, 3, 2)),
                    to: Some(date(2024, 3, 4)),
                },
            )
            .await
            .unwrap();
        let dates: Vec<NaiveDate> = filtered.iter().map(|b| b.backup_date).collect();
        assert_eq!(dates, vec![date(2024, 3, 2), date(2024, 3, 3), date(2024, 3, 4)]);
    }

    #[tokio::test]
    async fn test_table_stats() {
        let (repo, user) = setup().await;
        repo.upsert(user, "app_sessions", date(2024, 3, 1), "[]", "h", 3, Utc::now())
            .await
            .unwrap();
        repo.upsert(user, "app_sessions", date(2024, 3, 2), "[]", "h", 4, Utc::now())
            .await
            .unwrap();
        let stats = repo.table_stats(user).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].backup_count, 2);
        assert_eq!(stats[0].total_records, 7);
        assert_eq!(stats[0].last_backup_date, Some(date(2024, 3, 2)));
        assert!(stats[0].last_uploaded_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_by_table() {
        let (repo, user) = setup().await;
        repo.upsert(user, "app_sessions", date(2024, 3, 1), "[]", "h", 0, Utc::now())
            .await
            .unwrap();
        repo.upsert(user, "timer_sessions", date(2024, 3, 1), "[]", "h", 0, Utc::now())
            .await
            .unwrap();
        assert_eq!(repo.delete(user, Some("timer_sessions")).await.unwrap(), 1);
        assert_eq!(repo.delete(user, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_uses_user_retention() {
        let (repo, user) = setup().await;
        let prefs = BackupPreferences {
            retention_days: 10,
            ..Default::default()
        };
        repo.save_settings(user, &prefs, Utc::now()).await.unwrap();
        repo.upsert(user, "app_sessions", date(2024, 3, 1), "[]", "h", 0, Utc::now())
            .await
            .unwrap();
        repo.upsert(user, "app_sessions", date(2024, 3, 15), "[]", "h", 0, Utc::now())
            .await
            .unwrap();

        let purged = repo.purge_expired(date(2024, 3, 20), 90).await.unwrap();
        assert_eq!(purged, 1);
        let left = repo.list(user, &BackupQuery::default()).await.unwrap();
        assert_eq!(left[0].backup_date, date(2024, 3, 15));
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let (repo, user) = setup().await;
        assert!(repo.find_settings(user).await.unwrap().is_none());
        let prefs = BackupPreferences {
            wifi_only: false,
            backup_time: "03:30".to_string(),
            ..Default::default()
        };
        repo.save_settings(user, &prefs, Utc::now()).await.unwrap();
        let stored: BackupPreferences = repo.find_settings(user).await.unwrap().unwrap().into();
        assert_eq!(stored, prefs);
    }
}
