//! Authentication routes: SMS codes, registration, login, token management.

use axum::{extract::State, Json};
use chrono::Utc;
use domain::models::SmsPurpose;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::UserAuth;
use crate::response::ApiResponse;
use crate::routes::user::UserProfile;
use crate::services::sms::SentCode;
use crate::services::{AuthResult, AuthService, SmsService, TokenPair, VendorProfile};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsRequest {
    #[validate(custom(function = "shared::validation::validate_phone"))]
    pub phone: String,
    pub purpose: SmsPurpose,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifySmsRequest {
    #[validate(custom(function = "shared::validation::validate_phone"))]
    pub phone: String,
    #[validate(custom(function = "shared::validation::validate_sms_code"))]
    pub code: String,
    pub purpose: SmsPurpose,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(custom(function = "shared::validation::validate_phone"))]
    pub phone: String,
    #[validate(custom(function = "shared::validation::validate_sms_code"))]
    pub code: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    #[validate(length(max = 50, message = "Nickname must be at most 50 characters"))]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWithoutSmsRequest {
    #[validate(custom(function = "shared::validation::validate_username"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    #[validate(length(max = 50, message = "Nickname must be at most 50 characters"))]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Phone number or username.
    #[validate(length(min = 1, max = 64, message = "Account is required"))]
    pub account: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SmsLoginRequest {
    #[validate(custom(function = "shared::validation::validate_phone"))]
    pub phone: String,
    #[validate(custom(function = "shared::validation::validate_sms_code"))]
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AlipayLoginRequest {
    #[validate(length(min = 1, max = 64, message = "Alipay user id is required"))]
    pub alipay_user_id: String,
    #[validate(length(max = 50))]
    pub nickname: Option<String>,
    #[validate(url(message = "Invalid avatar URL"))]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginRequest {
    #[validate(length(min = 1, max = 128, message = "Google id is required"))]
    pub google_id: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub name: Option<String>,
    #[validate(url(message = "Invalid avatar URL"))]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub all_devices: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl From<TokenPair> for TokensResponse {
    fn from(tokens: TokenPair) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserProfile,
    pub tokens: TokensResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedResponse {
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub sessions_revoked: u64,
}

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(state.pool.clone(), state.jwt.clone())
}

fn sms_service(state: &AppState) -> SmsService<'_> {
    SmsService::new(state.pool.clone(), state.sms_sender.as_ref(), &state.config.sms)
}

/// 201 for a new account, 200 otherwise.
fn login_response(result: AuthResult, trial_days: i64) -> ApiResponse<LoginResponse> {
    let created = result.created;
    let body = LoginResponse {
        user: UserProfile::from_user(result.user, Utc::now(), trial_days),
        tokens: result.tokens.into(),
    };
    if created {
        ApiResponse::created(body).message("Account created")
    } else {
        ApiResponse::ok(body).message("Login successful")
    }
}

/// POST /api/auth/send-sms
pub async fn send_sms(
    State(state): State<AppState>,
    Json(request): Json<SendSmsRequest>,
) -> Result<ApiResponse<SentCode>, ApiError> {
    request.validate()?;

    let sent = sms_service(&state)
        .send(&request.phone, request.purpose, Utc::now())
        .await?;
    Ok(ApiResponse::ok(sent).message("Verification code sent"))
}

/// POST /api/auth/verify-sms
pub async fn verify_sms(
    State(state): State<AppState>,
    Json(request): Json<VerifySmsRequest>,
) -> Result<ApiResponse<VerifiedResponse>, ApiError> {
    request.validate()?;

    sms_service(&state)
        .verify(&request.phone, request.purpose, &request.code, Utc::now())
        .await?;
    Ok(ApiResponse::ok(VerifiedResponse { verified: true }))
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<ApiResponse<LoginResponse>, ApiError> {
    request.validate()?;

    let sms = sms_service(&state);
    let result = auth_service(&state)
        .register_with_phone(
            &sms,
            &request.phone,
            &request.code,
            &request.password,
            request.nickname.as_deref(),
            Utc::now(),
        )
        .await?;
    Ok(login_response(result, state.config.auth.trial_days))
}

/// POST /api/auth/register-no-sms
pub async fn register_without_sms(
    State(state): State<AppState>,
    Json(request): Json<RegisterWithoutSmsRequest>,
) -> Result<ApiResponse<LoginResponse>, ApiError> {
    request.validate()?;

    let result = auth_service(&state)
        .register_with_username(
            state.config.auth.allow_register_without_sms,
            &request.username,
            &request.password,
            request.nickname.as_deref(),
            Utc::now(),
        )
        .await?;
    Ok(login_response(result, state.config.auth.trial_days))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<ApiResponse<LoginResponse>, ApiError> {
    request.validate()?;

    let result = auth_service(&state)
        .login(&request.account, &request.password, Utc::now())
        .await?;
    Ok(login_response(result, state.config.auth.trial_days))
}

/// POST /api/auth/login-sms
pub async fn login_sms(
    State(state): State<AppState>,
    Json(request): Json<SmsLoginRequest>,
) -> Result<ApiResponse<LoginResponse>, ApiError> {
    request.validate()?;

    let sms = sms_service(&state);
    let result = auth_service(&state)
        .login_with_sms(&sms, &request.phone, &request.code, Utc::now())
        .await?;
    Ok(login_response(result, state.config.auth.trial_days))
}

/// POST /api/auth/login-alipay
pub async fn login_alipay(
    State(state): State<AppState>,
    Json(request): Json<AlipayLoginRequest>,
) -> Result<ApiResponse<LoginResponse>, ApiError> {
    request.validate()?;

    let profile = VendorProfile {
        nickname: request.nickname.as_deref(),
        avatar_url: request.avatar_url.as_deref(),
        email: None,
    };
    let result = auth_service(&state)
        .login_with_alipay(&request.alipay_user_id, profile, Utc::now())
        .await?;
    Ok(login_response(result, state.config.auth.trial_days))
}

/// POST /api/auth/login-google
pub async fn login_google(
    State(state): State<AppState>,
    Json(request): Json<GoogleLoginRequest>,
) -> Result<ApiResponse<LoginResponse>, ApiError> {
    request.validate()?;

    let profile = VendorProfile {
        nickname: request.name.as_deref(),
        avatar_url: request.avatar_url.as_deref(),
        email: request.email.as_deref(),
    };
    let result = auth_service(&state)
        .login_with_google(&request.google_id, profile, Utc::now())
        .await?;
    Ok(login_response(result, state.config.auth.trial_days))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<ApiResponse<TokensResponse>, ApiError> {
    request.validate()?;

    let tokens = auth_service(&state)
        .refresh(&request.refresh_token, Utc::now())
        .await?;
    Ok(ApiResponse::ok(tokens.into()).message("Token refreshed"))
}

/// POST /api/auth/logout
///
/// The body is optional; without one the calling session is revoked.
pub async fn logout(
    State(state): State<AppState>,
    auth: UserAuth,
    request: Option<Json<LogoutRequest>>,
) -> Result<ApiResponse<LogoutResponse>, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let revoked = auth_service(&state)
        .logout(
            auth.user_id,
            &auth.jti,
            request.refresh_token.as_deref(),
            request.all_devices,
        )
        .await?;

    tracing::info!(user_id = %auth.user_id, revoked, "User logged out");
    Ok(ApiResponse::ok(LogoutResponse {
        sessions_revoked: revoked,
    })
    .message("Logged out"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_sms_request_validation() {
        let request: SendSmsRequest =
            serde_json::from_value(json!({"phone": "13800138000", "purpose": "register"}))
                .unwrap();
        assert!(request.validate().is_ok());

        let request = SendSmsRequest {
            phone: "12345".into(),
            ..request
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_unknown_purpose_rejected() {
        let result: Result<SendSmsRequest, _> =
            serde_json::from_value(json!({"phone": "13800138000", "purpose": "spam"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_register_request_code_format() {
        let request = RegisterRequest {
            phone: "13800138000".into(),
            code: "12ab56".into(),
            password: "secret123".into(),
            nickname: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_username_format() {
        let request = RegisterWithoutSmsRequest {
            username: "1bad".into(),
            password: "secret123".into(),
            nickname: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_google_login_email_validated() {
        let request = GoogleLoginRequest {
            google_id: "g-1".into(),
            email: Some("not-an-email".into()),
            name: None,
            avatar_url: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_logout_request_defaults() {
        let request: LogoutRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.refresh_token.is_none());
        assert!(!request.all_devices);
    }

    #[test]
    fn test_tokens_response_serialization() {
        let response = TokensResponse {
            access_token: "a".into(),
            refresh_token: "r".into(),
            token_type: "Bearer".into(),
            expires_in: 3600,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["tokenType"], "Bearer");
        assert_eq!(json["expiresIn"], 3600);
    }
}
