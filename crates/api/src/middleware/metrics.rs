//! Prometheus metrics.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Count and time every request.
///
/// Paths are labelled by route template so query strings and unmatched
/// probes do not blow up cardinality.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = method_label(req.method());
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    counter!(
        "offtimes_http_requests_total",
        "method" => method,
        "path" => path.clone(),
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);

    histogram!(
        "offtimes_http_request_seconds",
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());

    response
}

/// Methods the API routes keep their name; the rest share one label.
fn method_label(method: &Method) -> &'static str {
    const ROUTED: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];
    ROUTED
        .into_iter()
        .find(|m| *m == method.as_str())
        .unwrap_or("OTHER")
}

pub fn record_login(provider: &'static str) {
    counter!("offtimes_logins_total", "provider" => provider).increment(1);
}

pub fn record_sms_sent(purpose: &'static str) {
    counter!("offtimes_sms_codes_sent_total", "purpose" => purpose).increment(1);
}

pub fn record_backup_upload(table: &'static str, unchanged: bool) {
    counter!(
        "offtimes_backup_uploads_total",
        "table" => table,
        "unchanged" => if unchanged { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_purchase_verified(platform: &'static str) {
    counter!("offtimes_purchases_verified_total", "platform" => platform).increment(1);
}

/// Serve the Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Install the global Prometheus recorder. Later calls are no-ops.
pub fn init_metrics() -> Result<(), BuildError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&[0.001, 0.005, 0.01, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0])?
        .install_recorder()?;

    // Lost race with a concurrent initializer; its handle serves the same recorder
    let _ = PROMETHEUS_HANDLE.set(handle);
    Ok(())
}
