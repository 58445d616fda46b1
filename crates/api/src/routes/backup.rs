//! Backup routes: upload, download, info, settings, clear.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use domain::models::{
    BackupPreferences, BackupRecord, BackupUploadRequest, BackupUploadResult,
    UpdateBackupSettingsRequest,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::UserAuth;
use crate::response::ApiResponse;
use crate::services::backup::BackupOverview;
use crate::services::{BackupService, DownloadFilter};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadQuery {
    pub table_name: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearQuery {
    pub table_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub backups: Vec<BackupRecord>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub deleted: u64,
}

fn backup_service(state: &AppState) -> BackupService<'_> {
    BackupService::new(state.pool.clone(), &state.config.backup)
}

/// POST /api/backup/upload
pub async fn upload(
    State(state): State<AppState>,
    auth: UserAuth,
    Json(request): Json<BackupUploadRequest>,
) -> Result<ApiResponse<BackupUploadResult>, ApiError> {
    request.validate()?;

    let result = backup_service(&state)
        .upload(auth.user_id, request, Utc::now())
        .await?;
    let message = if result.unchanged {
        "Backup unchanged"
    } else {
        "Backup stored"
    };
    Ok(ApiResponse::ok(result).message(message))
}

/// GET /api/backup/download
pub async fn download(
    State(state): State<AppState>,
    auth: UserAuth,
    Query(query): Query<DownloadQuery>,
) -> Result<ApiResponse<DownloadResponse>, ApiError> {
    let filter = DownloadFilter {
        table_name: query.table_name,
        from: query.from,
        to: query.to,
    };
    let backups = backup_service(&state).download(auth.user_id, &filter).await?;
    Ok(ApiResponse::ok(DownloadResponse {
        count: backups.len(),
        backups,
    }))
}

/// GET /api/backup/info
pub async fn info(
    State(state): State<AppState>,
    auth: UserAuth,
) -> Result<ApiResponse<BackupOverview>, ApiError> {
    let overview = backup_service(&state).overview(auth.user_id).await?;
    Ok(ApiResponse::ok(overview))
}

/// PUT /api/backup/settings
pub async fn update_settings(
    State(state): State<AppState>,
    auth: UserAuth,
    Json(request): Json<UpdateBackupSettingsRequest>,
) -> Result<ApiResponse<BackupPreferences>, ApiError> {
    request.validate()?;

    let prefs = backup_service(&state)
        .update_preferences(auth.user_id, &request, Utc::now())
        .await?;
    Ok(ApiResponse::ok(prefs).message("Backup settings updated"))
}

/// DELETE /api/backup/clear
pub async fn clear(
    State(state): State<AppState>,
    auth: UserAuth,
    Query(query): Query<ClearQuery>,
) -> Result<ApiResponse<ClearResponse>, ApiError> {
    let deleted = backup_service(&state)
        .clear(auth.user_id, query.table_name.as_deref())
        .await?;
    Ok(ApiResponse::ok(ClearResponse { deleted }).message("Backups cleared"))
}
