//! User repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::entities::{UserEntity, UserSessionEntity};
use crate::metrics::QueryTimer;

const USER_COLUMNS: &str = r#"
    id, phone, username, password_hash, nickname, avatar_url, alipay_user_id, google_id,
    google_email, is_premium, subscription_status, trial_start_time, payment_time, is_active,
    created_at, updated_at, last_login_at
"#;

/// Fields of a newly created account. Unset identifiers stay NULL.
#[derive(Debug, Clone, Default)]
pub struct NewUser<'a> {
    pub phone: Option<&'a str>,
    pub username: Option<&'a str>,
    pub password_hash: Option<&'a str>,
    pub nickname: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub alipay_user_id: Option<&'a str>,
    pub google_id: Option<&'a str>,
    pub google_email: Option<&'a str>,
}

/// Repository for user-related database operations.
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn find_by_column(
        &self,
        query_name: &'static str,
        column: &str,
        value: &str,
    ) -> Result<Option<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new(query_name);
        let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
        let result = sqlx::query_as::<_, UserEntity>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_user_by_id");
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let result = sqlx::query_as::<_, UserEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result
    }

    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<UserEntity>, sqlx::Error> {
        self.find_by_column("find_user_by_phone", "phone", phone).await
    }

    /// Usernames compare case-insensitively.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<UserEntity>, sqlx::Error> {
        self.find_by_column("find_user_by_username", "username", username)
            .await
    }

    pub async fn find_by_alipay_id(
        &self,
        alipay_user_id: &str,
    ) -> Result<Option<UserEntity>, sqlx::Error> {
        self.find_by_column("find_user_by_alipay_id", "alipay_user_id", alipay_user_id)
            .await
    }

    pub async fn find_by_google_id(&self, google_id: &str) -> Result<Option<UserEntity>, sqlx::Error> {
        self.find_by_column("find_user_by_google_id", "google_id", google_id)
            .await
    }

    pub async fn find_by_google_email(
        &self,
        email: &str,
    ) -> Result<Option<UserEntity>, sqlx::Error> {
        self.find_by_column("find_user_by_google_email", "google_email", email)
            .await
    }

    /// Create a new account. The trial window starts now.
    pub async fn create_user(
        &self,
        new_user: &NewUser<'_>,
        now: DateTime<Utc>,
    ) -> Result<UserEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_user");
        let sql = format!(
            r#"
            INSERT INTO users (id, phone, username, password_hash, nickname, avatar_url,
                               alipay_user_id, google_id, google_email, is_premium,
                               subscription_status, trial_start_time, is_active,
                               created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 'trial', ?10, 1, ?10, ?10)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let result = sqlx::query_as::<_, UserEntity>(&sql)
            .bind(Uuid::new_v4())
            .bind(new_user.phone)
            .bind(new_user.username)
            .bind(new_user.password_hash)
            .bind(new_user.nickname)
            .bind(new_user.avatar_url)
            .bind(new_user.alipay_user_id)
            .bind(new_user.google_id)
            .bind(new_user.google_email)
            .bind(now)
            .fetch_one(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Link a Google identity to an existing account.
    pub async fn link_google(
        &self,
        user_id: Uuid,
        google_id: &str,
        google_email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("link_google");
        let result = sqlx::query(
            r#"
            UPDATE users
            SET google_id = ?1, google_email = COALESCE(?2, google_email), updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(google_id)
        .bind(google_email)
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    /// Update nickname and/or avatar. `None` leaves a field unchanged.
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        nickname: Option<&str>,
        avatar_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("update_user_profile");
        let sql = format!(
            r#"
            UPDATE users
            SET nickname = COALESCE(?1, nickname),
                avatar_url = COALESCE(?2, avatar_url),
                updated_at = ?3
            WHERE id = ?4
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let result = sqlx::query_as::<_, UserEntity>(&sql)
            .bind(nickname)
            .bind(avatar_url)
            .bind(now)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result
    }

    pub async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("update_user_password");
        let result = sqlx::query("UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(password_hash)
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }

    pub async fn update_last_login(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("update_last_login");
        let result = sqlx::query("UPDATE users SET last_login_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|_| ())
    }

    /// Mark the account premium. Keeps the first payment time.
    pub async fn set_premium(
        &self,
        user_id: Uuid,
        payment_time: DateTime<Utc>,
    ) -> Result<Option<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("set_user_premium");
        let sql = format!(
            r#"
            UPDATE users
            SET is_premium = 1,
                subscription_status = 'active',
                payment_time = COALESCE(payment_time, ?1),
                updated_at = ?1
            WHERE id = ?2
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let result = sqlx::query_as::<_, UserEntity>(&sql)
            .bind(payment_time)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Marks non-premium accounts whose trial has ended as expired.
    pub async fn expire_trials(&self, started_before: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("expire_trials");
        let result = sqlx::query(
            r#"
            UPDATE users
            SET subscription_status = 'expired'
            WHERE is_premium = 0 AND subscription_status = 'trial' AND trial_start_time < ?1
            "#,
        )
        .bind(started_before)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected())
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Store a new session. Token hashes are SHA-256 of the JWT ids.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        refresh_token_hash: &str,
        provider: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<UserSessionEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_user_session");
        let result = sqlx::query_as::<_, UserSessionEntity>(
            r#"
            INSERT INTO user_sessions (id, user_id, token_hash, refresh_token_hash, provider,
                                       expires_at, created_at, last_used_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            RETURNING id, user_id, token_hash, refresh_token_hash, provider, expires_at,
                      created_at, last_used_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(refresh_token_hash)
        .bind(provider)
        .bind(expires_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_session_by_refresh_hash(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<UserSessionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_session_by_refresh_hash");
        let result = sqlx::query_as::<_, UserSessionEntity>(
            r#"
            SELECT id, user_id, token_hash, refresh_token_hash, provider, expires_at,
                   created_at, last_used_at
            FROM user_sessions
            WHERE refresh_token_hash = ?1
            "#,
        )
        .bind(refresh_token_hash)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Whether an unexpired session was issued for this access token hash.
    pub async fn access_session_active(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("access_session_active");
        let result: Result<i64, sqlx::Error> = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_sessions WHERE token_hash = ?1 AND expires_at > ?2",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result.map(|count| count > 0)
    }

    /// Replace the token hashes of a session (refresh rotation).
    ///
    /// Only succeeds while the session still holds `previous_refresh_hash`,
    /// so of two rotations with the same refresh token only one wins.
    pub async fn rotate_session(
        &self,
        session_id: Uuid,
        previous_refresh_hash: &str,
        token_hash: &str,
        refresh_token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("rotate_user_session");
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET token_hash = ?1, refresh_token_hash = ?2, expires_at = ?3, last_used_at = ?4
            WHERE id = ?5 AND refresh_token_hash = ?6
            "#,
        )
        .bind(token_hash)
        .bind(refresh_token_hash)
        .bind(expires_at)
        .bind(now)
        .bind(session_id)
        .bind(previous_refresh_hash)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }

    pub async fn delete_session(&self, session_id: Uuid) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("delete_user_session");
        let result = sqlx::query("DELETE FROM user_sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }

    /// Delete the session an access token belongs to.
    pub async fn delete_session_by_token_hash(
        &self,
        user_id: Uuid,
        token_hash: &str,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_session_by_token_hash");
        let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = ?1 AND token_hash = ?2")
            .bind(user_id)
            .bind(token_hash)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|r| r.rows_affected())
    }

    pub async fn delete_session_by_refresh_hash(
        &self,
        user_id: Uuid,
        refresh_token_hash: &str,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_session_by_refresh_hash");
        let result = sqlx::query(
            "DELETE FROM user_sessions WHERE user_id = ?1 AND refresh_token_hash = ?2",
        )
        .bind(user_id)
        .bind(refresh_token_hash)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected())
    }

    pub async fn delete_all_sessions(&self, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_all_user_sessions");
        let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|r| r.rows_affected())
    }

    pub async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_expired_sessions");
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|r| r.rows_affected())
    }
}
