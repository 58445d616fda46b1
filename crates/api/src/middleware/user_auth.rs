//! Bearer token authentication.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use persistence::repositories::UserRepository;
use shared::crypto::sha256_hex;
use shared::jwt::{JwtConfig, TokenType};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

/// Authenticated caller, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct UserAuth {
    pub user_id: Uuid,
    /// Access token id. Its hash identifies the login session.
    pub jti: String,
}

impl UserAuth {
    /// Check signature, expiry and token type of an access token.
    pub fn validate(jwt_config: &JwtConfig, token: &str) -> Result<Self, String> {
        let claims = jwt_config
            .verify(token, TokenType::Access)
            .map_err(|e| format!("Invalid token: {}", e))?;

        Ok(UserAuth {
            user_id: claims.sub,
            jti: claims.jti,
        })
    }
}

pub(crate) fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Reject requests without a valid access token of a live session.
///
/// A token stays signed-valid until it expires, so logout is enforced by
/// looking the session up on every request.
pub async fn require_user_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&req) else {
        return ApiError::Unauthorized("Missing or invalid Authorization header".into())
            .into_response();
    };

    let auth = match UserAuth::validate(&state.jwt, token) {
        Ok(auth) => auth,
        Err(e) => {
            tracing::debug!("JWT validation failed: {}", e);
            return ApiError::Unauthorized("Invalid or expired token".into()).into_response();
        }
    };

    let repo = UserRepository::new(state.pool.clone());
    match repo
        .access_session_active(&sha256_hex(&auth.jti), Utc::now())
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(user_id = %auth.user_id, "Session revoked or expired");
            return ApiError::Unauthorized("Session has been revoked".into()).into_response();
        }
        Err(e) => return ApiError::from(e).into_response(),
    }

    req.extensions_mut().insert(auth);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::jwt::TokenLifetimes;

    fn jwt() -> JwtConfig {
        let lifetimes = TokenLifetimes {
            access_secs: 3600,
            refresh_secs: 86400,
        };
        JwtConfig::with_secret("unit-test-secret-that-is-long-enough!!", lifetimes, 0).unwrap()
    }

    #[test]
    fn test_validate_access_token() {
        let jwt = jwt();
        let user_id = Uuid::new_v4();
        let issued = jwt.issue(user_id, TokenType::Access, Utc::now()).unwrap();
        let auth = UserAuth::validate(&jwt, &issued.token).unwrap();
        assert_eq!(auth.user_id, user_id);
        assert_eq!(auth.jti, issued.jti);
    }

    #[test]
    fn test_refresh_token_rejected() {
        let jwt = jwt();
        let issued = jwt
            .issue(Uuid::new_v4(), TokenType::Refresh, Utc::now())
            .unwrap();
        assert!(UserAuth::validate(&jwt, &issued.token).is_err());
    }

    #[test]
    fn test_bearer_token_parsing() {
        let req = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), Some("abc"));

        let req = Request::builder()
            .header(header::AUTHORIZATION, "Basic abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), None);

        let req = Request::builder()
            .header(header::AUTHORIZATION, "Bearer ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), None);
    }
}
