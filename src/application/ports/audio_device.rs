//! Audio Device Port - 音频输出设备抽象
//!
//! 设备持有一条单调时钟和一个增益输出；音源按绝对时钟时间启动，
//! 播放结束时通过回调通知（回调在设备锁外执行）。

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::DecodedSegment;

/// 音源 ID
pub type SourceId = u64;

/// 音源自然结束回调
pub type EndedCallback = Box<dyn FnOnce(SourceId) + Send + 'static>;

/// 音频设备错误
#[derive(Debug, Error)]
pub enum AudioDeviceError {
    #[error("Audio output unavailable: {0}")]
    Unavailable(String),

    #[error("Cannot start source at {start_at:.3}s, device time is {now:.3}s")]
    StartInPast { start_at: f64, now: f64 },

    #[error("Invalid source: {0}")]
    InvalidSource(String),
}

/// 设备状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Running,
    Suspended,
}

/// 音源参数
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub segment: DecodedSegment,
    /// 设备时钟上的启动时间（秒）
    pub start_at: f64,
    /// 播放速率，1.0 为原速
    pub playback_rate: f64,
}

impl SourceSpec {
    /// 在设备时间轴上占用的时长
    pub fn timeline_secs(&self) -> f64 {
        self.segment.playback_secs(self.playback_rate)
    }
}

/// Audio Device Port
#[async_trait]
pub trait AudioDevicePort: Send + Sync {
    /// 设备是否可用
    fn is_available(&self) -> bool;

    /// 当前设备时间（秒），挂起时冻结
    fn current_time(&self) -> f64;

    fn state(&self) -> DeviceState;

    /// 挂起输出与时钟
    async fn suspend(&self) -> Result<(), AudioDeviceError>;

    /// 恢复输出与时钟
    async fn resume(&self) -> Result<(), AudioDeviceError>;

    /// 设置输出增益
    fn set_gain(&self, gain: f32);

    fn gain(&self) -> f32;

    /// 在指定时间启动音源
    ///
    /// 启动时间早于当前设备时间时返回 `StartInPast`
    fn start_source(
        &self,
        spec: SourceSpec,
        on_ended: EndedCallback,
    ) -> Result<SourceId, AudioDeviceError>;

    /// 停止音源；已结束或未知的音源忽略。被强制停止的音源不触发结束回调。
    fn stop_source(&self, id: SourceId);
}
