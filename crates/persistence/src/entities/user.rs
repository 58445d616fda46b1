//! User account entities (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{LoginProvider, SubscriptionStatus};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Database row mapping for the users table.
#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: Uuid,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub alipay_user_id: Option<String>,
    pub google_id: Option<String>,
    pub google_email: Option<String>,
    pub is_premium: bool,
    pub subscription_status: String,
    pub trial_start_time: DateTime<Utc>,
    pub payment_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<UserEntity> for domain::models::User {
    fn from(entity: UserEntity) -> Self {
        Self {
            id: entity.id,
            phone: entity.phone,
            username: entity.username,
            password_hash: entity.password_hash,
            nickname: entity.nickname,
            avatar_url: entity.avatar_url,
            alipay_user_id: entity.alipay_user_id,
            google_id: entity.google_id,
            google_email: entity.google_email,
            is_premium: entity.is_premium,
            subscription_status: SubscriptionStatus::from_str(&entity.subscription_status)
                .unwrap_or_default(),
            trial_start_time: entity.trial_start_time,
            payment_time: entity.payment_time,
            is_active: entity.is_active,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            last_login_at: entity.last_login_at,
        }
    }
}

/// Database row mapping for the user_sessions table.
#[derive(Debug, Clone, FromRow)]
pub struct UserSessionEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub refresh_token_hash: String,
    pub provider: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl From<UserSessionEntity> for domain::models::UserSession {
    fn from(entity: UserSessionEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            token_hash: entity.token_hash,
            refresh_token_hash: entity.refresh_token_hash,
            provider: LoginProvider::from_str(&entity.provider).unwrap_or(LoginProvider::Password),
            expires_at: entity.expires_at,
            created_at: entity.created_at,
            last_used_at: entity.last_used_at,
        }
    }
}
