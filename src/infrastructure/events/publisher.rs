//! Event Publisher Implementation
//!
//! 播放器事件广播，供 WebSocket 推送与进度订阅使用

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::application::ports::{PlaybackSettings, PlaybackState, QueuedItem};
use crate::domain::{ProgressSnapshot, UtteranceRequest};

/// 朗读结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishOutcome {
    Completed,
    Stopped,
    Failed,
}

impl FinishOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

/// 播放器事件类型
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum PlayerEvent {
    /// 播放状态变更
    StateChanged { state: PlaybackState },
    /// 周期性进度
    Progress(ProgressSnapshot),
    /// 朗读开始
    UtteranceStarted {
        utterance_id: Uuid,
        text: String,
        voice: String,
        speed: f64,
        from_cache: bool,
    },
    /// 朗读结束
    UtteranceFinished {
        utterance_id: Uuid,
        outcome: FinishOutcome,
    },
    /// 队列变更
    QueueChanged { items: Vec<QueuedItem> },
    /// 预加载完成
    PreloadReady { utterance_id: Uuid },
    /// 合成失败
    SessionFailed { utterance_id: Uuid, error: String },
    /// 设置变更
    SettingsChanged {
        voice: String,
        speed: f64,
        queue_enabled: bool,
    },
}

/// 事件发布器
pub struct EventPublisher {
    channel: broadcast::Sender<PlayerEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (channel, _) = broadcast::channel(capacity.max(1));
        Self { channel }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅全部播放器事件
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.channel.subscribe()
    }

    pub fn publish_state_changed(&self, state: PlaybackState) {
        self.publish(PlayerEvent::StateChanged { state });
    }

    pub fn publish_progress(&self, snapshot: ProgressSnapshot) {
        self.publish(PlayerEvent::Progress(snapshot));
    }

    pub fn publish_utterance_started(&self, request: &UtteranceRequest, from_cache: bool) {
        self.publish(PlayerEvent::UtteranceStarted {
            utterance_id: request.id(),
            text: request.text().to_string(),
            voice: request.voice().to_string(),
            speed: request.speed().value(),
            from_cache,
        });
    }

    pub fn publish_utterance_finished(&self, utterance_id: Uuid, outcome: FinishOutcome) {
        self.publish(PlayerEvent::UtteranceFinished {
            utterance_id,
            outcome,
        });
    }

    pub fn publish_queue_changed(&self, items: Vec<QueuedItem>) {
        self.publish(PlayerEvent::QueueChanged { items });
    }

    pub fn publish_preload_ready(&self, utterance_id: Uuid) {
        self.publish(PlayerEvent::PreloadReady { utterance_id });
    }

    pub fn publish_session_failed(&self, utterance_id: Uuid, error: &str) {
        self.publish(PlayerEvent::SessionFailed {
            utterance_id,
            error: error.to_string(),
        });
    }

    pub fn publish_settings_changed(&self, settings: &PlaybackSettings) {
        self.publish(PlayerEvent::SettingsChanged {
            voice: settings.voice.to_string(),
            speed: settings.speed.value(),
            queue_enabled: settings.queue_enabled,
        });
    }

    fn publish(&self, event: PlayerEvent) {
        if let Err(e) = self.channel.send(event) {
            tracing::trace!(error = %e, "Failed to publish event (no receivers)");
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
