//! Purchase routes: verify, status, restore, config-status.

use axum::{extract::State, Json};
use chrono::Utc;
use domain::models::{
    PaymentConfigStatus, PurchaseStatusResponse, RestorePurchasesRequest, VerifyPurchaseRequest,
};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::UserAuth;
use crate::response::ApiResponse;
use crate::services::purchase::{RestoreOutcome, VerifyOutcome};
use crate::services::PurchaseService;

fn purchase_service(state: &AppState) -> PurchaseService {
    PurchaseService::new(
        state.pool.clone(),
        state.config.purchase.status(),
        state.config.auth.trial_days,
    )
}

/// POST /api/purchase/verify
pub async fn verify(
    State(state): State<AppState>,
    auth: UserAuth,
    Json(request): Json<VerifyPurchaseRequest>,
) -> Result<ApiResponse<VerifyOutcome>, ApiError> {
    request.validate()?;

    let outcome = purchase_service(&state)
        .verify(auth.user_id, &request, Utc::now())
        .await?;
    let message = if outcome.newly_claimed {
        "Purchase verified"
    } else {
        "Purchase already verified"
    };
    Ok(ApiResponse::ok(outcome).message(message))
}

/// GET /api/purchase/status
pub async fn status(
    State(state): State<AppState>,
    auth: UserAuth,
) -> Result<ApiResponse<PurchaseStatusResponse>, ApiError> {
    let status = purchase_service(&state)
        .status(auth.user_id, Utc::now())
        .await?;
    Ok(ApiResponse::ok(status))
}

/// POST /api/purchase/restore
pub async fn restore(
    State(state): State<AppState>,
    auth: UserAuth,
    request: Option<Json<RestorePurchasesRequest>>,
) -> Result<ApiResponse<RestoreOutcome>, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;

    let order_ids = request.order_ids.unwrap_or_default();
    let outcome = purchase_service(&state)
        .restore(auth.user_id, &order_ids)
        .await?;
    Ok(ApiResponse::ok(outcome).message("Purchases restored"))
}

/// GET /api/purchase/config-status
pub async fn config_status(State(state): State<AppState>) -> ApiResponse<PaymentConfigStatus> {
    ApiResponse::ok(purchase_service(&state).config_status())
}
