//! Playback Control Port - 播放控制面
//!
//! 朗读、停止、暂停/恢复、排队管理，由播放器 actor 实现

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{ProgressSnapshot, UtteranceRequest};

/// 播放控制错误
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Player is not running")]
    PlayerStopped,

    #[error("Queue index {index} out of range (queue length {len})")]
    QueueIndexOutOfRange { index: usize, len: usize },

    #[error("Audio device error: {0}")]
    Device(String),
}

/// 播放器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    /// 等待首个音频片段
    Loading,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
        }
    }
}

/// 新请求的准入结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Admission {
    /// 立即开始
    Started { utterance_id: Uuid },
    /// 追加到队尾，position 从 0 开始
    Enqueued { utterance_id: Uuid, position: usize },
    /// 打断当前朗读后开始
    Interrupted {
        utterance_id: Uuid,
        stopped: Option<Uuid>,
    },
}

impl Admission {
    pub fn utterance_id(&self) -> Uuid {
        match self {
            Self::Started { utterance_id }
            | Self::Enqueued { utterance_id, .. }
            | Self::Interrupted { utterance_id, .. } => *utterance_id,
        }
    }
}

/// 队列条目视图
#[derive(Debug, Clone, Serialize)]
pub struct QueuedItem {
    pub utterance_id: Uuid,
    pub text: String,
    pub voice: String,
    pub speed: f64,
    pub word_count: usize,
    /// 是否已预加载完成
    pub preloaded: bool,
}

/// 播放器快照
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub current: Option<UtteranceRequest>,
    pub progress: Option<ProgressSnapshot>,
    pub queue: Vec<QueuedItem>,
    pub queue_enabled: bool,
}

/// Playback Control Port
#[async_trait]
pub trait PlaybackControlPort: Send + Sync {
    /// 提交朗读请求（按准入规则开始、排队或打断）
    async fn speak(&self, request: UtteranceRequest) -> Result<Admission, PlaybackError>;

    /// 追加到队尾；空闲时立即开始
    async fn enqueue(&self, request: UtteranceRequest) -> Result<Admission, PlaybackError>;

    /// 停止当前朗读并推进队列，返回新的当前朗读
    async fn stop(&self) -> Result<Option<Uuid>, PlaybackError>;

    async fn pause(&self) -> Result<(), PlaybackError>;

    async fn resume(&self) -> Result<(), PlaybackError>;

    /// 移除尚未开始的排队请求
    async fn remove_from_queue(&self, index: usize) -> Result<UtteranceRequest, PlaybackError>;

    async fn set_queue_enabled(&self, enabled: bool) -> Result<(), PlaybackError>;

    async fn snapshot(&self) -> Result<PlaybackSnapshot, PlaybackError>;
}
