//! SMS code repository.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::entities::SmsCodeEntity;
use crate::metrics::QueryTimer;

/// Repository for SMS verification codes.
#[derive(Clone)]
pub struct SmsCodeRepository {
    pool: SqlitePool,
}

impl SmsCodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a new code and retire every earlier unconsumed code for the
    /// same phone and purpose.
    pub async fn create(
        &self,
        phone: &str,
        purpose: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SmsCodeEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_sms_code");
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE sms_codes SET consumed = 1 WHERE phone = ?1 AND purpose = ?2 AND consumed = 0",
        )
        .bind(phone)
        .bind(purpose)
        .execute(&mut *tx)
        .await?;

        let entity = sqlx::query_as::<_, SmsCodeEntity>(
            r#"
            INSERT INTO sms_codes (id, phone, purpose, code_hash, attempts, verified, consumed,
                                   expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, 0, 0, ?5, ?6)
            RETURNING id, phone, purpose, code_hash, attempts, verified, consumed,
                      expires_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(phone)
        .bind(purpose)
        .bind(code_hash)
        .bind(expires_at)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();
        Ok(entity)
    }

    /// Most recently issued code for the phone and purpose.
    pub async fn find_latest(
        &self,
        phone: &str,
        purpose: &str,
    ) -> Result<Option<SmsCodeEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_latest_sms_code");
        let result = sqlx::query_as::<_, SmsCodeEntity>(
            r#"
            SELECT id, phone, purpose, code_hash, attempts, verified, consumed,
                   expires_at, created_at
            FROM sms_codes
            WHERE phone = ?1 AND purpose = ?2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(phone)
        .bind(purpose)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn increment_attempts(&self, id: Uuid) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("increment_sms_attempts");
        let result = sqlx::query("UPDATE sms_codes SET attempts = attempts + 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|_| ())
    }

    pub async fn mark_verified(&self, id: Uuid) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("mark_sms_verified");
        let result = sqlx::query("UPDATE sms_codes SET verified = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|_| ())
    }

    /// Burn the code. Returns false if it was already consumed.
    pub async fn mark_consumed(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("mark_sms_consumed");
        let result = sqlx::query("UPDATE sms_codes SET consumed = 1 WHERE id = ?1 AND consumed = 0")
            .bind(id)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }

    pub async fn delete_expired(&self, before: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_expired_sms_codes");
        let result = sqlx::query("DELETE FROM sms_codes WHERE expires_at <= ?1")
            .bind(before)
            .execute(&self.pool)
            .await;
        timer.record();
        result.map(|r| r.rows_affected())
    }
}
