//! Data Transfer Objects

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::ports::{
    Admission, PlaybackSettings, PlaybackSnapshot, PlaybackState, QueuedItem,
};
use crate::application::SpeakResponse;
use crate::domain::{ProgressSnapshot, UtteranceRequest};

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }

    /// 错误响应
    #[allow(dead_code)]
    pub fn error(errno: i32, error: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            errno,
            error: error.into(),
            data: None,
        }
    }
}

/// 空数据响应
#[derive(Debug, Serialize)]
pub struct Empty {}

impl ApiResponse<Empty> {
    /// 成功但无数据
    pub fn ok() -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(Empty {}),
        }
    }
}

// ============================================================================
// Playback DTOs
// ============================================================================

/// 朗读/排队请求，voice/speed 缺省时使用当前设置
#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SpeakResponseDto {
    pub admission: Admission,
    pub utterance_id: Uuid,
    pub text: String,
    pub voice: String,
    pub speed: f64,
    pub char_count: usize,
}

impl From<SpeakResponse> for SpeakResponseDto {
    fn from(resp: SpeakResponse) -> Self {
        Self {
            utterance_id: resp.request.id(),
            text: resp.request.text().to_string(),
            voice: resp.request.voice().to_string(),
            speed: resp.request.speed().value(),
            char_count: resp.request.char_count(),
            admission: resp.admission,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StopResponseDto {
    pub next: Option<Uuid>,
}

/// 当前朗读
#[derive(Debug, Serialize)]
pub struct CurrentUtteranceDto {
    pub utterance_id: Uuid,
    pub text: String,
    pub voice: String,
    pub speed: f64,
}

impl From<&UtteranceRequest> for CurrentUtteranceDto {
    fn from(request: &UtteranceRequest) -> Self {
        Self {
            utterance_id: request.id(),
            text: request.text().to_string(),
            voice: request.voice().to_string(),
            speed: request.speed().value(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlaybackStateResponse {
    pub state: PlaybackState,
    pub current: Option<CurrentUtteranceDto>,
    pub progress: Option<ProgressSnapshot>,
    pub queue: Vec<QueuedItem>,
    pub queue_enabled: bool,
}

impl From<PlaybackSnapshot> for PlaybackStateResponse {
    fn from(snapshot: PlaybackSnapshot) -> Self {
        Self {
            state: snapshot.state,
            current: snapshot.current.as_ref().map(CurrentUtteranceDto::from),
            progress: snapshot.progress,
            queue: snapshot.queue,
            queue_enabled: snapshot.queue_enabled,
        }
    }
}

// ============================================================================
// Queue DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RemoveQueuedRequest {
    pub index: usize,
}

#[derive(Debug, Serialize)]
pub struct RemoveQueuedResponseDto {
    pub removed: CurrentUtteranceDto,
}

// ============================================================================
// Settings DTOs
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub queue_enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub voice: String,
    pub speed: f64,
    pub queue_enabled: bool,
}

impl From<PlaybackSettings> for SettingsResponse {
    fn from(settings: PlaybackSettings) -> Self {
        Self {
            voice: settings.voice.to_string(),
            speed: settings.speed.value(),
            queue_enabled: settings.queue_enabled,
        }
    }
}
