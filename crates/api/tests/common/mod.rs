//! Common test utilities for integration tests.
//!
//! Every test gets its own in-memory SQLite database with the server
//! migrations applied.

// Not every helper is used by every test binary
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use domain::models::SmsPurpose;
use offtimes_api::app::{create_app, AppState};
use offtimes_api::config::Config;
use offtimes_api::services::{SmsError, SmsSender};
use persistence::db::{create_memory_pool, run_server_migrations};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// Keeps every code it is asked to deliver.
#[derive(Default)]
pub struct RecordingSmsSender {
    sent: Mutex<Vec<(String, SmsPurpose, String)>>,
}

impl RecordingSmsSender {
    /// Latest code sent to `phone` for `purpose`.
    pub fn last_code(&self, phone: &str, purpose: SmsPurpose) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(p, pur, _)| p == phone && *pur == purpose)
            .map(|(_, _, code)| code.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl SmsSender for RecordingSmsSender {
    async fn send_code(&self, phone: &str, code: &str, purpose: SmsPurpose) -> Result<(), SmsError> {
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_string(), purpose, code.to_string()));
        Ok(())
    }
}

/// A router over a fresh database, plus handles the tests inspect.
pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pub sms: Arc<RecordingSmsSender>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_overrides(&[]).await
    }

    pub async fn with_overrides(overrides: &[(&str, &str)]) -> Self {
        let config = Config::load_for_test(overrides).expect("test config");
        let pool = create_memory_pool().await.expect("memory pool");
        run_server_migrations(&pool).await.expect("migrations");
        let sms = Arc::new(RecordingSmsSender::default());

        let state = AppState::new(config, pool.clone(), sms.clone()).expect("app state");
        Self {
            router: create_app(state),
            pool,
            sms,
        }
    }

    /// Send a request and return status plus parsed JSON body.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, parse_response_body(response).await)
    }

    /// Register a username account and return its access and refresh tokens.
    pub async fn register_user(&self, username: &str) -> (String, String) {
        let (status, body) = self
            .send(json_request(
                Method::POST,
                "/api/auth/register-no-sms",
                json!({"username": username, "password": "secret123"}),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        tokens(&body)
    }

    /// Register a phone account through the SMS flow.
    pub async fn register_phone(&self, phone: &str, password: &str) -> Value {
        let (status, _) = self
            .send(json_request(
                Method::POST,
                "/api/auth/send-sms",
                json!({"phone": phone, "purpose": "register"}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        let code = self
            .sms
            .last_code(phone, SmsPurpose::Register)
            .expect("code sent");

        let (status, body) = self
            .send(json_request(
                Method::POST,
                "/api/auth/register",
                json!({"phone": phone, "code": code, "password": password}),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body
    }
}

/// Access and refresh token from a login response.
pub fn tokens(body: &Value) -> (String, String) {
    let tokens = &body["data"]["tokens"];
    (
        tokens["accessToken"].as_str().unwrap().to_string(),
        tokens["refreshToken"].as_str().unwrap().to_string(),
    )
}

/// Helper to create a JSON request.
pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Helper to create an authenticated JSON request.
pub fn authed_json_request(method: Method, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Helper to create an authenticated request without a body.
pub fn authed_request(method: Method, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}
