//! SMS verification codes: issue, deliver, verify, consume.

use chrono::{DateTime, Duration, Utc};
use domain::models::{user::mask_phone, SmsCode, SmsPurpose};
use persistence::repositories::SmsCodeRepository;
use shared::crypto::{generate_sms_code, sms_code_hash};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

use crate::config::SmsConfig;
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("Please wait {0} seconds before requesting another code")]
    Cooldown(i64),

    #[error("No verification code was requested")]
    NotRequested,

    #[error("Verification code has expired")]
    Expired,

    #[error("Verification code is incorrect")]
    Mismatch,

    #[error("Too many wrong attempts, request a new code")]
    TooManyAttempts,

    #[error("Verification code has already been used")]
    AlreadyUsed,

    #[error("SMS delivery failed: {0}")]
    Delivery(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<SmsError> for ApiError {
    fn from(err: SmsError) -> Self {
        match err {
            SmsError::Cooldown(_) => ApiError::TooManyRequests(err.to_string()),
            SmsError::NotRequested
            | SmsError::Expired
            | SmsError::Mismatch
            | SmsError::TooManyAttempts
            | SmsError::AlreadyUsed => ApiError::Validation(err.to_string()),
            SmsError::Delivery(msg) => ApiError::ServiceUnavailable(msg),
            SmsError::Database(e) => e.into(),
        }
    }
}

/// Delivery channel for verification codes.
#[async_trait::async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_code(&self, phone: &str, code: &str, purpose: SmsPurpose)
        -> Result<(), SmsError>;
}

/// Writes codes to the log. Development and self-hosted setups only.
#[derive(Debug, Default)]
pub struct ConsoleSmsSender;

#[async_trait::async_trait]
impl SmsSender for ConsoleSmsSender {
    async fn send_code(
        &self,
        phone: &str,
        code: &str,
        purpose: SmsPurpose,
    ) -> Result<(), SmsError> {
        tracing::info!(
            phone = %mask_phone(phone),
            purpose = %purpose,
            code = %code,
            "SMS verification code (console provider)"
        );
        Ok(())
    }
}

/// Build the sender named by `sms.provider`.
pub fn sender_for(config: &SmsConfig) -> Result<Arc<dyn SmsSender>, String> {
    match config.provider.as_str() {
        "console" => Ok(Arc::new(ConsoleSmsSender)),
        other => Err(format!("Unsupported SMS provider: {}", other)),
    }
}

/// Outcome of a send, returned to the client.
#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentCode {
    pub expires_in: i64,
    pub resend_after: i64,
}

pub struct SmsService<'a> {
    repo: SmsCodeRepository,
    sender: &'a dyn SmsSender,
    config: &'a SmsConfig,
}

impl<'a> SmsService<'a> {
    pub fn new(pool: SqlitePool, sender: &'a dyn SmsSender, config: &'a SmsConfig) -> Self {
        Self {
            repo: SmsCodeRepository::new(pool),
            sender,
            config,
        }
    }

    /// Issue a fresh code, retiring earlier ones for the same phone and purpose.
    pub async fn send(
        &self,
        phone: &str,
        purpose: SmsPurpose,
        now: DateTime<Utc>,
    ) -> Result<SentCode, SmsError> {
        if let Some(latest) = self.repo.find_latest(phone, purpose.as_str()).await? {
            let ready_at = latest.created_at + Duration::seconds(self.config.resend_cooldown_secs);
            if now < ready_at {
                let wait = (ready_at - now).num_seconds().max(1);
                return Err(SmsError::Cooldown(wait));
            }
        }

        let code = generate_sms_code();
        let expires_at = now + Duration::seconds(self.config.code_ttl_secs);
        let stored = self
            .repo
            .create(
                phone,
                purpose.as_str(),
                &sms_code_hash(phone, &code),
                expires_at,
                now,
            )
            .await?;

        if let Err(e) = self.sender.send_code(phone, &code, purpose).await {
            // A code the user never received must not stay verifiable
            self.repo.mark_consumed(stored.id).await?;
            return Err(e);
        }

        crate::middleware::metrics::record_sms_sent(purpose.as_str());
        Ok(SentCode {
            expires_in: self.config.code_ttl_secs,
            resend_after: self.config.resend_cooldown_secs,
        })
    }

    /// Check a code without using it up. Wrong guesses count against the code.
    pub async fn verify(
        &self,
        phone: &str,
        purpose: SmsPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<SmsCode, SmsError> {
        let stored: SmsCode = self
            .repo
            .find_latest(phone, purpose.as_str())
            .await?
            .ok_or(SmsError::NotRequested)?
            .into();

        if stored.consumed {
            return Err(SmsError::AlreadyUsed);
        }
        if stored.is_expired(now) {
            return Err(SmsError::Expired);
        }
        if !stored.is_usable(now) {
            return Err(SmsError::TooManyAttempts);
        }
        if stored.code_hash != sms_code_hash(phone, code) {
            self.repo.increment_attempts(stored.id).await?;
            return Err(SmsError::Mismatch);
        }

        if !stored.verified {
            self.repo.mark_verified(stored.id).await?;
        }
        Ok(stored)
    }

    /// Verify and use up a code. A code backs at most one register or login.
    pub async fn consume(
        &self,
        phone: &str,
        purpose: SmsPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SmsError> {
        let stored = self.verify(phone, purpose, code, now).await?;
        if !self.repo.mark_consumed(stored.id).await? {
            return Err(SmsError::AlreadyUsed);
        }
        Ok(())
    }
}
