//! Settings Handlers

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::{GetSettings, UpdateSettingsCommand};
use crate::infrastructure::http::dto::{ApiResponse, SettingsResponse, UpdateSettingsRequest};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SettingsResponse>>, ApiError> {
    let settings = state.get_settings_handler.handle(GetSettings).await?;
    Ok(Json(ApiResponse::success(settings.into())))
}

/// 部分更新：只修改请求中出现的字段
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<ApiResponse<SettingsResponse>>, ApiError> {
    let cmd = UpdateSettingsCommand {
        voice: req.voice,
        speed: req.speed,
        queue_enabled: req.queue_enabled,
    };

    let settings = state.update_settings_handler.handle(cmd).await?;
    Ok(Json(ApiResponse::success(settings.into())))
}
