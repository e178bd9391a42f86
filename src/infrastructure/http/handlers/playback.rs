//! Playback Handlers - 朗读、停止、暂停与状态查询

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::{
    EnqueueCommand, GetPlaybackState, PauseCommand, ResumeCommand, SpeakCommand, StopCommand,
};
use crate::infrastructure::http::dto::{
    ApiResponse, Empty, PlaybackStateResponse, SpeakRequest, SpeakResponseDto, StopResponseDto,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

// ============================================================================
// Speak / Enqueue
// ============================================================================

pub async fn speak(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpeakRequest>,
) -> Result<Json<ApiResponse<SpeakResponseDto>>, ApiError> {
    let cmd = SpeakCommand {
        text: req.text,
        voice: req.voice,
        speed: req.speed,
    };

    let result = state.speak_handler.handle(cmd).await?;
    Ok(Json(ApiResponse::success(result.into())))
}

pub async fn enqueue(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpeakRequest>,
) -> Result<Json<ApiResponse<SpeakResponseDto>>, ApiError> {
    let cmd = EnqueueCommand {
        text: req.text,
        voice: req.voice,
        speed: req.speed,
    };

    let result = state.enqueue_handler.handle(cmd).await?;
    Ok(Json(ApiResponse::success(result.into())))
}

// ============================================================================
// Stop / Pause / Resume
// ============================================================================

pub async fn stop(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<StopResponseDto>>, ApiError> {
    let result = state.stop_handler.handle(StopCommand).await?;
    Ok(Json(ApiResponse::success(StopResponseDto { next: result.next })))
}

pub async fn pause(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Empty>>, ApiError> {
    state.pause_handler.handle(PauseCommand).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn resume(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Empty>>, ApiError> {
    state.resume_handler.handle(ResumeCommand).await?;
    Ok(Json(ApiResponse::ok()))
}

// ============================================================================
// State
// ============================================================================

pub async fn playback_state(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<PlaybackStateResponse>>, ApiError> {
    let snapshot = state
        .get_playback_state_handler
        .handle(GetPlaybackState)
        .await?;
    Ok(Json(ApiResponse::success(snapshot.into())))
}
