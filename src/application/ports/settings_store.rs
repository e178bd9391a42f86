//! Settings Store Port - 用户播放设置持久化

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Speed, Voice};

/// 设置存储错误
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// 播放设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    #[serde(default)]
    pub voice: Voice,

    #[serde(default)]
    pub speed: Speed,

    /// 是否启用排队（关闭时新请求会打断当前朗读）
    #[serde(default)]
    pub queue_enabled: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            voice: Voice::default(),
            speed: Speed::default(),
            queue_enabled: false,
        }
    }
}

/// Settings Store Port
#[async_trait]
pub trait SettingsStorePort: Send + Sync {
    /// 读取设置，不存在时返回默认值
    async fn load(&self) -> Result<PlaybackSettings, SettingsError>;

    async fn save(&self, settings: &PlaybackSettings) -> Result<(), SettingsError>;
}
