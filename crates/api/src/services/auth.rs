//! Account creation, login by every provider, token rotation and logout.

use chrono::{DateTime, Utc};
use domain::models::{LoginProvider, SmsPurpose, User};
use persistence::repositories::{NewUser, UserRepository};
use shared::crypto::sha256_hex;
use shared::jwt::{JwtConfig, JwtError, TokenType};
use shared::password::{check_password_strength, hash_password, verify_password, PasswordError};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::services::sms::{SmsError, SmsService};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Phone number already registered")]
    PhoneTaken,

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Registration without SMS verification is disabled")]
    RegistrationDisabled,

    #[error("Invalid account or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    UserDisabled,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Session has expired, please sign in again")]
    SessionExpired,

    #[error("Current password is incorrect")]
    WrongPassword,

    #[error("{0}")]
    Sms(#[from] SmsError),

    #[error("Token error: {0}")]
    Token(#[from] JwtError),

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::PhoneTaken | AuthError::UsernameTaken => ApiError::Conflict(err.to_string()),
            AuthError::RegistrationDisabled | AuthError::UserDisabled => {
                ApiError::Forbidden(err.to_string())
            }
            AuthError::InvalidCredentials
            | AuthError::InvalidRefreshToken
            | AuthError::SessionExpired => ApiError::Unauthorized(err.to_string()),
            AuthError::WrongPassword => ApiError::Validation(err.to_string()),
            AuthError::UserNotFound => ApiError::NotFound(err.to_string()),
            AuthError::Sms(e) => e.into(),
            AuthError::Password(PasswordError::TooWeak(msg)) => ApiError::Validation(msg.into()),
            AuthError::Password(e) => ApiError::Internal(format!("Password error: {}", e)),
            AuthError::Token(e) => ApiError::Internal(format!("Token error: {}", e)),
            AuthError::Database(e) => e.into(),
        }
    }
}

/// Access and refresh token issued for one login session.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub access_token_jti: String,
    pub refresh_token: String,
    pub refresh_token_jti: String,
    pub expires_in: i64,
    pub refresh_expires_at: DateTime<Utc>,
}

/// A signed-in user with fresh tokens.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub user: User,
    pub tokens: TokenPair,
    /// True when the login created the account.
    pub created: bool,
}

/// Profile fields a vendor login may carry.
#[derive(Debug, Clone, Default)]
pub struct VendorProfile<'a> {
    pub nickname: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub email: Option<&'a str>,
}

pub struct AuthService {
    users: UserRepository,
    jwt: Arc<JwtConfig>,
}

impl AuthService {
    pub fn new(pool: SqlitePool, jwt: Arc<JwtConfig>) -> Self {
        Self {
            users: UserRepository::new(pool),
            jwt,
        }
    }

    /// Phone registration, backed by a `register` SMS code.
    pub async fn register_with_phone(
        &self,
        sms: &SmsService<'_>,
        phone: &str,
        code: &str,
        password: &str,
        nickname: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        check_password_strength(password)?;
        if self.users.find_by_phone(phone).await?.is_some() {
            return Err(AuthError::PhoneTaken);
        }
        sms.consume(phone, SmsPurpose::Register, code, now).await?;

        let password_hash = hash_password(password)?;
        let user = self
            .create(
                &NewUser {
                    phone: Some(phone),
                    password_hash: Some(&password_hash),
                    nickname,
                    ..Default::default()
                },
                now,
                AuthError::PhoneTaken,
            )
            .await?;

        tracing::info!(user_id = %user.id, "User registered with phone");
        self.start_session(user, LoginProvider::Sms, true, now).await
    }

    /// Username registration, only when the deployment allows it.
    pub async fn register_with_username(
        &self,
        allowed: bool,
        username: &str,
        password: &str,
        nickname: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        if !allowed {
            return Err(AuthError::RegistrationDisabled);
        }
        check_password_strength(password)?;
        if self.users.find_by_username(username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let password_hash = hash_password(password)?;
        let user = self
            .create(
                &NewUser {
                    username: Some(username),
                    password_hash: Some(&password_hash),
                    nickname,
                    ..Default::default()
                },
                now,
                AuthError::UsernameTaken,
            )
            .await?;

        tracing::info!(user_id = %user.id, "User registered with username");
        self.start_session(user, LoginProvider::Password, true, now)
            .await
    }

    /// Password login. `account` is a phone number or a username.
    pub async fn login(
        &self,
        account: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        let found = if shared::validation::is_phone_number(account) {
            self.users.find_by_phone(account).await?
        } else {
            self.users.find_by_username(account).await?
        };
        let user: User = found.ok_or(AuthError::InvalidCredentials)?.into();

        // Accounts created by SMS or vendor login have no password
        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        self.start_session(user, LoginProvider::Password, false, now)
            .await
    }

    /// SMS login. Unknown phones get a new account.
    pub async fn login_with_sms(
        &self,
        sms: &SmsService<'_>,
        phone: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        sms.consume(phone, SmsPurpose::Login, code, now).await?;

        match self.users.find_by_phone(phone).await? {
            Some(entity) => {
                self.start_session(entity.into(), LoginProvider::Sms, false, now)
                    .await
            }
            None => {
                let user = self
                    .create(
                        &NewUser {
                            phone: Some(phone),
                            ..Default::default()
                        },
                        now,
                        AuthError::PhoneTaken,
                    )
                    .await?;
                tracing::info!(user_id = %user.id, "User created by SMS login");
                self.start_session(user, LoginProvider::Sms, true, now).await
            }
        }
    }

    /// Alipay login by the Alipay user id the client obtained.
    pub async fn login_with_alipay(
        &self,
        alipay_user_id: &str,
        profile: VendorProfile<'_>,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        if let Some(entity) = self.users.find_by_alipay_id(alipay_user_id).await? {
            return self
                .start_session(entity.into(), LoginProvider::Alipay, false, now)
                .await;
        }

        let user = self
            .create(
                &NewUser {
                    alipay_user_id: Some(alipay_user_id),
                    nickname: profile.nickname,
                    avatar_url: profile.avatar_url,
                    ..Default::default()
                },
                now,
                AuthError::InvalidCredentials,
            )
            .await?;
        tracing::info!(user_id = %user.id, "User created by Alipay login");
        self.start_session(user, LoginProvider::Alipay, true, now)
            .await
    }

    /// Google login. An account with the same Google email gets the id linked.
    pub async fn login_with_google(
        &self,
        google_id: &str,
        profile: VendorProfile<'_>,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        if let Some(entity) = self.users.find_by_google_id(google_id).await? {
            return self
                .start_session(entity.into(), LoginProvider::Google, false, now)
                .await;
        }

        if let Some(email) = profile.email {
            if let Some(existing) = self.users.find_by_google_email(email).await? {
                self.users
                    .link_google(existing.id, google_id, Some(email), now)
                    .await?;
                let user = self.require_user(existing.id).await?;
                tracing::info!(user_id = %user.id, "Linked Google account by email");
                return self
                    .start_session(user, LoginProvider::Google, false, now)
                    .await;
            }
        }

        let user = self
            .create(
                &NewUser {
                    google_id: Some(google_id),
                    google_email: profile.email,
                    nickname: profile.nickname,
                    avatar_url: profile.avatar_url,
                    ..Default::default()
                },
                now,
                AuthError::InvalidCredentials,
            )
            .await?;
        tracing::info!(user_id = %user.id, "User created by Google login");
        self.start_session(user, LoginProvider::Google, true, now)
            .await
    }

    /// Exchange a refresh token for a new pair. The old pair stops working.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let claims = self
            .jwt
            .verify(refresh_token, TokenType::Refresh)
            .map_err(|_| AuthError::InvalidRefreshToken)?;
        let user_id = claims.sub;

        let refresh_hash = sha256_hex(&claims.jti);
        let session = self
            .users
            .find_session_by_refresh_hash(&refresh_hash)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;
        if session.user_id != user_id {
            return Err(AuthError::InvalidRefreshToken);
        }
        if session.expires_at <= now {
            self.users.delete_session(session.id).await?;
            return Err(AuthError::SessionExpired);
        }

        let user = self.require_user(user_id).await?;
        if !user.is_active {
            self.users.delete_session(session.id).await?;
            return Err(AuthError::UserDisabled);
        }

        let tokens = self.issue_tokens(user_id, now)?;
        let rotated = self
            .users
            .rotate_session(
                session.id,
                &refresh_hash,
                &sha256_hex(&tokens.access_token_jti),
                &sha256_hex(&tokens.refresh_token_jti),
                tokens.refresh_expires_at,
                now,
            )
            .await?;
        if !rotated {
            // A concurrent refresh already consumed this token
            return Err(AuthError::InvalidRefreshToken);
        }
        Ok(tokens)
    }

    /// End the caller's session, one named by refresh token, or all of them.
    ///
    /// Returns the number of sessions removed.
    pub async fn logout(
        &self,
        user_id: Uuid,
        access_jti: &str,
        refresh_token: Option<&str>,
        all_devices: bool,
    ) -> Result<u64, AuthError> {
        if all_devices {
            return Ok(self.users.delete_all_sessions(user_id).await?);
        }

        if let Some(token) = refresh_token {
            let claims = self
                .jwt
                .verify(token, TokenType::Refresh)
                .map_err(|_| AuthError::InvalidRefreshToken)?;
            return Ok(self
                .users
                .delete_session_by_refresh_hash(user_id, &sha256_hex(&claims.jti))
                .await?);
        }

        Ok(self
            .users
            .delete_session_by_token_hash(user_id, &sha256_hex(access_jti))
            .await?)
    }

    /// Set a new password. The old one is required when the account has one.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: Option<&str>,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let user = self.require_user(user_id).await?;
        if let Some(hash) = user.password_hash.as_deref() {
            let old = old_password.ok_or(AuthError::WrongPassword)?;
            if !verify_password(old, hash)? {
                return Err(AuthError::WrongPassword);
            }
        }
        check_password_strength(new_password)?;

        let hash = hash_password(new_password)?;
        if !self.users.update_password(user_id, &hash, now).await? {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .map(Into::into)
            .ok_or(AuthError::UserNotFound)
    }

    /// Insert a user, turning a unique-key race into `on_conflict`.
    async fn create(
        &self,
        new_user: &NewUser<'_>,
        now: DateTime<Utc>,
        on_conflict: AuthError,
    ) -> Result<User, AuthError> {
        match self.users.create_user(new_user, now).await {
            Ok(entity) => Ok(entity.into()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(on_conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn start_session(
        &self,
        user: User,
        provider: LoginProvider,
        created: bool,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        if !user.is_active {
            return Err(AuthError::UserDisabled);
        }

        let tokens = self.issue_tokens(user.id, now)?;
        self.users
            .create_session(
                user.id,
                &sha256_hex(&tokens.access_token_jti),
                &sha256_hex(&tokens.refresh_token_jti),
                provider.as_str(),
                tokens.refresh_expires_at,
                now,
            )
            .await?;
        self.users.update_last_login(user.id, now).await?;
        crate::middleware::metrics::record_login(provider.as_str());

        Ok(AuthResult {
            user,
            tokens,
            created,
        })
    }

    /// The login session lives as long as its refresh token.
    fn issue_tokens(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let access = self.jwt.issue(user_id, TokenType::Access, now)?;
        let refresh = self.jwt.issue(user_id, TokenType::Refresh, now)?;
        Ok(TokenPair {
            access_token: access.token,
            access_token_jti: access.jti,
            refresh_token: refresh.token,
            refresh_token_jti: refresh.jti,
            expires_in: self.jwt.lifetimes().access_secs,
            refresh_expires_at: refresh.expires_at,
        })
    }
}
