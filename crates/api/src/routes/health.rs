//! Health check endpoint handlers.

use axum::extract::State;
use domain::models::PaymentConfigStatus;
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::response::ApiResponse;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: DatabaseHealth,
    pub sms_provider: String,
    pub payments: PaymentConfigStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHealth {
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// Simple status response for liveness/readiness probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

async fn ping(state: &AppState) -> Option<u64> {
    let start = std::time::Instant::now();
    sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .ok()
        .map(|_| start.elapsed().as_millis() as u64)
}

/// Full health check: database round trip plus configured integrations.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<ApiResponse<HealthResponse>, ApiError> {
    let latency_ms = ping(&state).await;
    if latency_ms.is_none() {
        return Err(ApiError::ServiceUnavailable("Database unreachable".into()));
    }

    Ok(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: DatabaseHealth {
            connected: true,
            latency_ms,
        },
        sms_provider: state.config.sms.provider.clone(),
        payments: state.config.purchase.status(),
    }))
}

/// Liveness probe endpoint.
///
/// Returns 200 OK if the process is running.
pub async fn live() -> ApiResponse<StatusResponse> {
    ApiResponse::ok(StatusResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 OK if the service can accept traffic (database connected).
pub async fn ready(State(state): State<AppState>) -> Result<ApiResponse<StatusResponse>, ApiError> {
    match ping(&state).await {
        Some(_) => Ok(ApiResponse::ok(StatusResponse {
            status: "ready".to_string(),
        })),
        None => Err(ApiError::ServiceUnavailable("Database unreachable".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            database: DatabaseHealth {
                connected: true,
                latency_ms: Some(5),
            },
            sms_provider: "console".to_string(),
            payments: PaymentConfigStatus {
                alipay: true,
                google_play: false,
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["database"]["latencyMs"], 5);
        assert_eq!(json["smsProvider"], "console");
        assert_eq!(json["payments"]["googlePlay"], false);
    }

    #[test]
    fn test_status_response() {
        let response = StatusResponse {
            status: "ready".to_string(),
        };
        assert_eq!(serde_json::to_value(&response).unwrap()["status"], "ready");
    }
}
