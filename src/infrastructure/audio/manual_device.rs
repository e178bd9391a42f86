//! Manual Audio Device - 手动推进时钟的设备
//!
//! 时钟只在调用 `advance` 时前进，用于确定性测试与离线模拟

use async_trait::async_trait;
use std::sync::Arc;

use super::timeline::{StartedSource, VirtualTimeline};
use crate::application::ports::{
    AudioDeviceError, AudioDevicePort, DeviceState, EndedCallback, SourceId, SourceSpec,
};

pub struct ManualAudioDevice {
    timeline: Arc<VirtualTimeline>,
    available: bool,
}

impl ManualAudioDevice {
    pub fn new() -> Self {
        Self {
            timeline: Arc::new(VirtualTimeline::with_source_log()),
            available: true,
        }
    }

    /// 模拟不可用的输出设备
    pub fn unavailable() -> Self {
        Self {
            timeline: Arc::new(VirtualTimeline::with_source_log()),
            available: false,
        }
    }

    /// 推进设备时钟，返回本次自然结束的音源数
    pub fn advance(&self, secs: f64) -> usize {
        self.timeline.advance(secs)
    }

    /// 按固定步长推进直到没有活动音源（或达到上限）
    pub fn run_until_idle(&self, step: f64, max_secs: f64) -> f64 {
        let mut advanced = 0.0;
        while self.timeline.active_count() > 0 && advanced < max_secs {
            self.timeline.advance(step);
            advanced += step;
        }
        advanced
    }

    /// 全部已启动音源（按启动顺序）
    pub fn started_sources(&self) -> Vec<StartedSource> {
        self.timeline.started_sources()
    }

    pub fn active_sources(&self) -> usize {
        self.timeline.active_count()
    }
}

impl Default for ManualAudioDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioDevicePort for ManualAudioDevice {
    fn is_available(&self) -> bool {
        self.available
    }

    fn current_time(&self) -> f64 {
        self.timeline.now()
    }

    fn state(&self) -> DeviceState {
        if self.timeline.is_suspended() {
            DeviceState::Suspended
        } else {
            DeviceState::Running
        }
    }

    async fn suspend(&self) -> Result<(), AudioDeviceError> {
        self.timeline.set_suspended(true);
        Ok(())
    }

    async fn resume(&self) -> Result<(), AudioDeviceError> {
        self.timeline.set_suspended(false);
        Ok(())
    }

    fn set_gain(&self, gain: f32) {
        self.timeline.set_gain(gain);
    }

    fn gain(&self) -> f32 {
        self.timeline.gain()
    }

    fn start_source(
        &self,
        spec: SourceSpec,
        on_ended: EndedCallback,
    ) -> Result<SourceId, AudioDeviceError> {
        if !self.available {
            return Err(AudioDeviceError::Unavailable("manual device disabled".to_string()));
        }
        self.timeline.start(spec, on_ended)
    }

    fn stop_source(&self, id: SourceId) {
        self.timeline.stop(id);
    }
}
