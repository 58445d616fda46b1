//! Shared helpers for tracker integration tests.

// Not every helper is used by every test binary
#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use offtimes_api::app::{create_app, AppState};
use offtimes_api::config::Config;
use offtimes_api::services::ConsoleSmsSender;
use persistence::db::{create_memory_pool, run_server_migrations};
use serde_json::json;
use sqlx::SqlitePool;
use std::net::SocketAddr;
use std::sync::Arc;

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn offset_hours(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap()
}

/// A fresh usage store installed at `install`.
pub async fn store(install: DateTime<Utc>) -> SqlitePool {
    offtimes_tracker::store::open_in_memory(install)
        .await
        .expect("usage store")
}

/// Start the API server on an ephemeral port. Returns its base URL.
pub async fn spawn_server() -> String {
    let config = Config::load_for_test(&[]).expect("test config");
    let pool = create_memory_pool().await.expect("memory pool");
    run_server_migrations(&pool).await.expect("migrations");
    let state = AppState::new(config, pool, Arc::new(ConsoleSmsSender)).expect("app state");
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("server");
    });
    format!("http://{}", addr)
}

/// Create a username account on the server.
pub async fn register(base_url: &str, username: &str, password: &str) {
    let response = reqwest::Client::new()
        .post(format!("{}/api/auth/register-no-sms", base_url))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("register request");
    assert_eq!(response.status().as_u16(), 201);
}
