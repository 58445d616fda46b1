//! Profile and password routes for the signed-in user.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use domain::models::{LoginProvider, SubscriptionStatus, User};
use domain::services::subscription;
use persistence::repositories::UserRepository;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::UserAuth;
use crate::response::ApiResponse;
use crate::services::AuthService;

/// User as returned to the app.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub google_email: Option<String>,
    pub linked_providers: Vec<LoginProvider>,
    pub is_premium: bool,
    pub subscription_status: SubscriptionStatus,
    pub trial_start_time: DateTime<Utc>,
    pub payment_time: Option<DateTime<Utc>>,
    pub has_access: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn from_user(user: User, now: DateTime<Utc>, trial_days: i64) -> Self {
        Self {
            display_name: user.display_name(),
            linked_providers: user.linked_providers(),
            has_access: subscription::has_access(
                user.is_premium,
                user.trial_start_time,
                now,
                trial_days,
            ),
            id: user.id,
            phone: user.phone,
            username: user.username,
            nickname: user.nickname,
            avatar_url: user.avatar_url,
            google_email: user.google_email,
            is_premium: user.is_premium,
            subscription_status: user.subscription_status,
            trial_start_time: user.trial_start_time,
            payment_time: user.payment_time,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 50, message = "Nickname must be 1-50 characters"))]
    pub nickname: Option<String>,
    #[validate(url(message = "Invalid avatar URL"))]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,
}

/// GET /api/user/profile
pub async fn get_profile(
    State(state): State<AppState>,
    auth: UserAuth,
) -> Result<ApiResponse<UserProfile>, ApiError> {
    let user: User = UserRepository::new(state.pool.clone())
        .find_by_id(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?
        .into();

    Ok(ApiResponse::ok(UserProfile::from_user(
        user,
        Utc::now(),
        state.config.auth.trial_days,
    )))
}

/// PUT /api/user/profile
pub async fn update_profile(
    State(state): State<AppState>,
    auth: UserAuth,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<ApiResponse<UserProfile>, ApiError> {
    request.validate()?;

    let now = Utc::now();
    let user: User = UserRepository::new(state.pool.clone())
        .update_profile(
            auth.user_id,
            request.nickname.as_deref(),
            request.avatar_url.as_deref(),
            now,
        )
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?
        .into();

    tracing::info!(user_id = %auth.user_id, "Profile updated");
    Ok(
        ApiResponse::ok(UserProfile::from_user(user, now, state.config.auth.trial_days))
            .message("Profile updated"),
    )
}

/// PUT /api/user/password
pub async fn change_password(
    State(state): State<AppState>,
    auth: UserAuth,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    request.validate()?;

    AuthService::new(state.pool.clone(), state.jwt.clone())
        .change_password(
            auth.user_id,
            request.old_password.as_deref(),
            &request.new_password,
            Utc::now(),
        )
        .await?;

    tracing::info!(user_id = %auth.user_id, "Password changed");
    Ok(ApiResponse::empty("Password updated"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            phone: Some("13800138000".into()),
            username: None,
            password_hash: Some("$argon2id$hash".into()),
            nickname: None,
            avatar_url: None,
            alipay_user_id: None,
            google_id: None,
            google_email: None,
            is_premium: false,
            subscription_status: SubscriptionStatus::Trial,
            trial_start_time: now,
            payment_time: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    #[test]
    fn test_profile_never_contains_password_hash() {
        let profile = UserProfile::from_user(user(), Utc::now(), 7);
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"displayName\":\"138****8000\""));
        assert!(json.contains("\"linkedProviders\":[\"password\",\"sms\"]"));
    }

    #[test]
    fn test_profile_access_follows_trial() {
        let u = user();
        let later = u.trial_start_time + chrono::Duration::days(8);
        assert!(!UserProfile::from_user(u, later, 7).has_access);
    }

    #[test]
    fn test_update_profile_validation() {
        let request = UpdateProfileRequest {
            nickname: Some(String::new()),
            avatar_url: None,
        };
        assert!(request.validate().is_err());

        let request = UpdateProfileRequest {
            nickname: None,
            avatar_url: Some("https://example.com/a.png".into()),
        };
        assert!(request.validate().is_ok());
    }
}
