//! Integration tests for authentication flows.

mod common;

use axum::http::{Method, StatusCode};
use common::{authed_json_request, authed_request, json_request, tokens, TestApp};
use domain::models::SmsPurpose;
use serde_json::json;

const PHONE: &str = "13800138000";

// ============================================================================
// SMS codes
// ============================================================================

#[tokio::test]
async fn test_send_sms_then_resend_in_cooldown() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/send-sms",
            json!({"phone": PHONE, "purpose": "login"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["expiresIn"], 300);
    assert_eq!(body["data"]["resendAfter"], 60);

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/send-sms",
            json!({"phone": PHONE, "purpose": "login"}),
        ))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], 429);
    assert_eq!(body["success"], false);
    assert_eq!(app.sms.sent_count(), 1);
}

#[tokio::test]
async fn test_send_sms_rejects_bad_phone() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/send-sms",
            json!({"phone": "555-0100", "purpose": "login"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["error"], "validation_error");
    assert_eq!(body["data"]["details"][0]["field"], "phone");
}

#[tokio::test]
async fn test_verify_sms_wrong_then_right() {
    let app = TestApp::new().await;
    app.send(json_request(
        Method::POST,
        "/api/auth/send-sms",
        json!({"phone": PHONE, "purpose": "reset_password"}),
    ))
    .await;
    let code = app.sms.last_code(PHONE, SmsPurpose::ResetPassword).unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/api/auth/verify-sms",
            json!({"phone": PHONE, "code": wrong, "purpose": "reset_password"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/verify-sms",
            json!({"phone": PHONE, "code": code, "purpose": "reset_password"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["verified"], true);
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_with_phone() {
    let app = TestApp::new().await;
    let body = app.register_phone(PHONE, "secret123").await;

    assert_eq!(body["code"], 201);
    assert_eq!(body["data"]["user"]["phone"], PHONE);
    assert_eq!(body["data"]["user"]["subscriptionStatus"], "trial");
    assert_eq!(body["data"]["user"]["hasAccess"], true);
    assert_eq!(body["data"]["tokens"]["tokenType"], "Bearer");
    assert!(body["data"]["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_register_code_cannot_be_reused() {
    let app = TestApp::new().await;
    app.register_phone(PHONE, "secret123").await;
    let code = app.sms.last_code(PHONE, SmsPurpose::Register).unwrap();

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/register",
            json!({"phone": PHONE, "code": code, "password": "secret123"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["data"]["error"], "conflict");
}

#[tokio::test]
async fn test_register_with_login_code_rejected() {
    let app = TestApp::new().await;
    app.send(json_request(
        Method::POST,
        "/api/auth/send-sms",
        json!({"phone": PHONE, "purpose": "login"}),
    ))
    .await;
    let code = app.sms.last_code(PHONE, SmsPurpose::Login).unwrap();

    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/api/auth/register",
            json!({"phone": PHONE, "code": code, "password": "secret123"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_without_sms_disabled() {
    let app = TestApp::with_overrides(&[("auth.allow_register_without_sms", "false")]).await;
    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/api/auth/register-no-sms",
            json!({"username": "no_sms_user", "password": "secret123"}),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_register_weak_password() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/register-no-sms",
            json!({"username": "weak_user", "password": "123"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_by_phone_and_username() {
    let app = TestApp::new().await;
    app.register_phone(PHONE, "secret123").await;
    app.register_user("focus_fan").await;

    for account in [PHONE, "focus_fan"] {
        let (status, body) = app
            .send(json_request(
                Method::POST,
                "/api/auth/login",
                json!({"account": account, "password": "secret123"}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "login as {}", account);
        assert!(body["data"]["tokens"]["accessToken"].is_string());
    }

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/login",
            json!({"account": "focus_fan", "password": "wrong-pass"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["data"]["error"], "unauthorized");
}

#[tokio::test]
async fn test_sms_login_creates_account() {
    let app = TestApp::new().await;
    app.send(json_request(
        Method::POST,
        "/api/auth/send-sms",
        json!({"phone": PHONE, "purpose": "login"}),
    ))
    .await;
    let code = app.sms.last_code(PHONE, SmsPurpose::Login).unwrap();

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/login-sms",
            json!({"phone": PHONE, "code": code}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["user"]["linkedProviders"], json!(["sms"]));
}

#[tokio::test]
async fn test_vendor_logins() {
    let app = TestApp::new().await;

    let (status, first) = app
        .send(json_request(
            Method::POST,
            "/api/auth/login-alipay",
            json!({"alipayUserId": "2088102", "nickname": "Ali"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["data"]["user"]["displayName"], "Ali");

    let (status, again) = app
        .send(json_request(
            Method::POST,
            "/api/auth/login-alipay",
            json!({"alipayUserId": "2088102"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["data"]["user"]["id"], first["data"]["user"]["id"]);

    let (status, google) = app
        .send(json_request(
            Method::POST,
            "/api/auth/login-google",
            json!({"googleId": "1057", "email": "fan@example.com", "name": "Fan"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(google["data"]["user"]["googleEmail"], "fan@example.com");
}

// ============================================================================
// Tokens
// ============================================================================

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let app = TestApp::new().await;
    let (_, refresh_token) = app.register_user("rotator").await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/refresh",
            json!({"refreshToken": refresh_token}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, refresh_token);

    // The old refresh token is dead
    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/api/auth/refresh",
            json!({"refreshToken": refresh_token}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rotated_access_token_is_revoked() {
    let app = TestApp::new().await;
    let (access, refresh_token) = app.register_user("old_access").await;

    app.send(json_request(
        Method::POST,
        "/api/auth/refresh",
        json!({"refreshToken": refresh_token}),
    ))
    .await;

    let (status, _) = app
        .send(authed_request(Method::GET, "/api/user/profile", &access))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let app = TestApp::new().await;
    let (access, _) = app.register_user("leaver").await;

    let (status, body) = app
        .send(authed_request(Method::POST, "/api/auth/logout", &access))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sessionsRevoked"], 1);

    let (status, _) = app
        .send(authed_request(Method::GET, "/api/user/profile", &access))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_all_devices() {
    let app = TestApp::new().await;
    let (first_access, _) = app.register_user("many_devices").await;

    let (_, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/login",
            json!({"account": "many_devices", "password": "secret123"}),
        ))
        .await;
    let (second_access, _) = tokens(&body);

    let (status, body) = app
        .send(authed_json_request(
            Method::POST,
            "/api/auth/logout",
            &second_access,
            json!({"allDevices": true}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sessionsRevoked"], 2);

    let (status, _) = app
        .send(authed_request(Method::GET, "/api/user/profile", &first_access))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_requires_auth() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(json_request(Method::POST, "/api/auth/logout", json!({})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}
