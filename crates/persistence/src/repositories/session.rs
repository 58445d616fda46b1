//! App usage and offline timer sessions.

use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::entities::{AppSessionEntity, TimerSessionEntity};
use crate::metrics::QueryTimer;

const APP_SESSION_COLUMNS: &str =
    "s.id, s.package_name, s.category_id, s.date, s.start_time, s.end_time, s.duration_seconds, s.is_offline";

const TIMER_COLUMNS: &str =
    "id, category_id, program_name, date, start_time, end_time, duration_seconds, is_active";

/// A foreground interval reported by the platform.
#[derive(Debug, Clone)]
pub struct NewAppSession<'a> {
    pub package_name: &'a str,
    pub category_id: i64,
    pub date: NaiveDate,
    pub start_time: i64,
    pub end_time: i64,
}

/// Repository for raw usage sessions.
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record an app session. Re-imports of the same interval are ignored.
    ///
    /// Returns false when the session already existed.
    pub async fn insert_app_session(&self, session: &NewAppSession<'_>) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("insert_app_session");
        let duration = (session.end_time - session.start_time).max(0) / 1000;
        let result = sqlx::query(
            r#"
            INSERT INTO app_sessions (package_name, category_id, date, start_time, end_time,
                                      duration_seconds, is_offline)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
            ON CONFLICT (package_name, start_time) DO NOTHING
            "#,
        )
        .bind(session.package_name)
        .bind(session.category_id)
        .bind(session.date)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(duration)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }

    /// Sessions stored under `date`.
    pub async fn app_sessions_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<AppSessionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("app_sessions_for_date");
        let sql = format!(
            "SELECT {} FROM app_sessions s WHERE s.date = ?1 ORDER BY s.start_time",
            APP_SESSION_COLUMNS
        );
        let result = sqlx::query_as::<_, AppSessionEntity>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Sessions overlapping `[start_ms, end_ms)`, skipping excluded apps.
    pub async fn counted_app_sessions_between(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<AppSessionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("counted_app_sessions_between");
        let sql = format!(
            r#"
            SELECT {}
            FROM app_sessions s
            LEFT JOIN app_info a ON a.package_name = s.package_name
            WHERE s.start_time < ?2 AND s.end_time > ?1
              AND COALESCE(a.is_excluded, 0) = 0
            ORDER BY s.start_time
            "#,
            APP_SESSION_COLUMNS
        );
        let result = sqlx::query_as::<_, AppSessionEntity>(&sql)
            .bind(start_ms)
            .bind(end_ms)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result
    }

    /// `(start_time, end_time)` of every stored session of `package_name`.
    pub async fn app_session_spans(&self, package_name: &str) -> Result<Vec<(i64, i64)>, sqlx::Error> {
        let timer = QueryTimer::new("app_session_spans");
        let result = sqlx::query_as::<_, (i64, i64)>(
            "SELECT start_time, end_time FROM app_sessions WHERE package_name = ?1",
        )
        .bind(package_name)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn delete_app_sessions_before(&self, date: NaiveDate) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_app_sessions_before");
        let result = sqlx::query("DELETE FROM app_sessions WHERE date < ?1")
            .bind(date)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|r| r.rows_affected())
    }

    // ------------------------------------------------------------------
    // Offline timers
    // ------------------------------------------------------------------

    /// Start a timer. Fails with a unique violation if one is already running.
    pub async fn start_timer(
        &self,
        category_id: i64,
        program_name: &str,
        date: NaiveDate,
        start_time: i64,
    ) -> Result<TimerSessionEntity, sqlx::Error> {
        let timer = QueryTimer::new("start_timer");
        let sql = format!(
            r#"
            INSERT INTO timer_sessions (category_id, program_name, date, start_time, end_time,
                                        duration_seconds, is_active)
            VALUES (?1, ?2, ?3, ?4, NULL, 0, 1)
            RETURNING {}
            "#,
            TIMER_COLUMNS
        );
        let result = sqlx::query_as::<_, TimerSessionEntity>(&sql)
            .bind(category_id)
            .bind(program_name)
            .bind(date)
            .bind(start_time)
            .fetch_one(&self.pool)
            .await;
        timer.record();
        result
    }

    pub async fn active_timer(&self) -> Result<Option<TimerSessionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("active_timer");
        let sql = format!(
            "SELECT {} FROM timer_sessions WHERE is_active = 1 LIMIT 1",
            TIMER_COLUMNS
        );
        let result = sqlx::query_as::<_, TimerSessionEntity>(&sql)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Finish a running timer. Returns None if it was not running.
    pub async fn stop_timer(
        &self,
        id: i64,
        end_time: i64,
        duration_seconds: i64,
    ) -> Result<Option<TimerSessionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("stop_timer");
        let sql = format!(
            r#"
            UPDATE timer_sessions
            SET end_time = ?1, duration_seconds = ?2, is_active = 0
            WHERE id = ?3 AND is_active = 1
            RETURNING {}
            "#,
            TIMER_COLUMNS
        );
        let result = sqlx::query_as::<_, TimerSessionEntity>(&sql)
            .bind(end_time)
            .bind(duration_seconds)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result
    }

    pub async fn timer_sessions_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<TimerSessionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("timer_sessions_for_date");
        let sql = format!(
            "SELECT {} FROM timer_sessions WHERE date = ?1 ORDER BY start_time",
            TIMER_COLUMNS
        );
        let result = sqlx::query_as::<_, TimerSessionEntity>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Finished timers overlapping `[start_ms, end_ms)`.
    pub async fn finished_timers_between(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<TimerSessionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("finished_timers_between");
        let sql = format!(
            r#"
            SELECT {}
            FROM timer_sessions
            WHERE is_active = 0 AND start_time < ?2 AND end_time > ?1
            ORDER BY start_time
            "#,
            TIMER_COLUMNS
        );
        let result = sqlx::query_as::<_, TimerSessionEntity>(&sql)
            .bind(start_ms)
            .bind(end_ms)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, run_tracker_migrations};

    async fn repo() -> SessionRepository {
        let pool = create_memory_pool().await.unwrap();
        run_tracker_migrations(&pool).await.unwrap();
        SessionRepository::new(pool)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_app_session_ignored() {
        let repo = repo().await;
        let session = NewAppSession {
            package_name: "com.example.video",
            category_id: 1,
            date: date(),
            start_time: 1_000_000,
            end_time: 1_060_000,
        };
        assert!(repo.insert_app_session(&session).await.unwrap());
        assert!(!repo.insert_app_session(&session).await.unwrap());

        let stored = repo.app_sessions_for_date(date()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].duration_seconds, 60);
        assert_eq!(
            repo.app_session_spans("com.example.video").await.unwrap(),
            vec![(1_000_000, 1_060_000)]
        );
        assert!(repo.app_session_spans("com.other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_excluded_apps_not_counted() {
        let pool = create_memory_pool().await.unwrap();
        run_tracker_migrations(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO app_info (package_name, app_name, category_id, is_excluded) VALUES ('com.launcher', 'Launcher', 5, 1)",
        )
        .execute(&pool)
        .await
        .unwrap();
        let repo = SessionRepository::new(pool);
        for package in ["com.launcher", "com.example.video"] {
            repo.insert_app_session(&NewAppSession {
                package_name: package,
                category_id: 1,
                date: date(),
                start_time: 1_000_000,
                end_time: 2_000_000,
            })
            .await
            .unwrap();
        }
        let counted = repo.counted_app_sessions_between(0, 5_000_000).await.unwrap();
        assert_eq!(counted.len(), 1);
        assert_eq!(counted[0].package_name, "com.example.video");
    }

    #[tokio::test]
    async fn test_only_one_active_timer() {
        let repo = repo().await;
        let running = repo.start_timer(3, "Running", date(), 1_000).await.unwrap();
        assert!(running.is_active);
        let err = repo.start_timer(2, "Reading", date(), 2_000).await.unwrap_err();
        match err {
            sqlx::Error::Database(db) => assert!(db.is_unique_violation()),
            other => panic!("unexpected error: {other:?}"),
        }

        let stopped = repo.stop_timer(running.id, 61_000, 60).await.unwrap().unwrap();
        assert!(!stopped.is_active);
        assert_eq!(stopped.end_time, Some(61_000));
        assert!(repo.active_timer().await.unwrap().is_none());
        assert!(repo.stop_timer(running.id, 99_000, 98).await.unwrap().is_none());

        // A new timer may start once the previous one stopped
        repo.start_timer(2, "Reading", date(), 70_000).await.unwrap();
        assert_eq!(repo.finished_timers_between(0, 100_000).await.unwrap().len(), 1);
    }
}
