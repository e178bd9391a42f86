//! Queue Handlers

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::RemoveQueuedCommand;
use crate::infrastructure::http::dto::{
    ApiResponse, CurrentUtteranceDto, RemoveQueuedRequest, RemoveQueuedResponseDto,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 移除尚未开始的排队项
pub async fn remove_queued(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RemoveQueuedRequest>,
) -> Result<Json<ApiResponse<RemoveQueuedResponseDto>>, ApiError> {
    let result = state
        .remove_queued_handler
        .handle(RemoveQueuedCommand { index: req.index })
        .await?;

    Ok(Json(ApiResponse::success(RemoveQueuedResponseDto {
        removed: CurrentUtteranceDto::from(&result.removed),
    })))
}
