//! SMS verification code entity.

use chrono::{DateTime, Utc};
use domain::models::SmsPurpose;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Database row mapping for the sms_codes table.
#[derive(Debug, Clone, FromRow)]
pub struct SmsCodeEntity {
    pub id: Uuid,
    pub phone: String,
    pub purpose: String,
    pub code_hash: String,
    pub attempts: i32,
    pub verified: bool,
    pub consumed: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<SmsCodeEntity> for domain::models::SmsCode {
    fn from(entity: SmsCodeEntity) -> Self {
        Self {
            id: entity.id,
            phone: entity.phone,
            // The column is constrained to valid purposes
            purpose: SmsPurpose::from_str(&entity.purpose).unwrap_or(SmsPurpose::Login),
            code_hash: entity.code_hash,
            attempts: entity.attempts,
            verified: entity.verified,
            consumed: entity.consumed,
            expires_at: entity.expires_at,
            created_at: entity.created_at,
        }
    }
}
