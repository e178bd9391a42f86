//! Audio Clock - 全局音频输出上下文
//!
//! 封装输出设备：单调时钟 + 固定增益输出。挂起/恢复幂等。

use std::sync::Arc;

use crate::application::ports::{
    AudioDeviceError, AudioDevicePort, DeviceState, EndedCallback, SourceId, SourceSpec,
};

/// 默认输出增益
pub const DEFAULT_GAIN: f32 = 2.0;

pub struct AudioClock {
    device: Arc<dyn AudioDevicePort>,
    gain: f32,
}

impl AudioClock {
    /// 创建音频时钟
    ///
    /// 设备不可用时返回 `Unavailable`，属于启动期致命错误
    pub fn new(device: Arc<dyn AudioDevicePort>, gain: f32) -> Result<Self, AudioDeviceError> {
        if !device.is_available() {
            return Err(AudioDeviceError::Unavailable(
                "audio output device is not available".to_string(),
            ));
        }
        if !gain.is_finite() || gain < 0.0 {
            return Err(AudioDeviceError::InvalidSource(format!("invalid output gain: {}", gain)));
        }

        device.set_gain(gain);
        tracing::info!(gain = gain, "Audio clock initialized");

        Ok(Self { device, gain })
    }

    /// 当前时钟时间（秒）
    pub fn now(&self) -> f64 {
        self.device.current_time()
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn is_suspended(&self) -> bool {
        self.device.state() == DeviceState::Suspended
    }

    /// 挂起；已挂起时无操作
    pub async fn suspend(&self) -> Result<(), AudioDeviceError> {
        if self.is_suspended() {
            return Ok(());
        }
        self.device.suspend().await?;
        tracing::debug!(at = self.now(), "Audio clock suspended");
        Ok(())
    }

    /// 恢复；运行中时无操作
    pub async fn resume(&self) -> Result<(), AudioDeviceError> {
        if !self.is_suspended() {
            return Ok(());
        }
        self.device.resume().await?;
        tracing::debug!(at = self.now(), "Audio clock resumed");
        Ok(())
    }

    /// 在增益输出上启动音源
    pub fn start_source(
        &self,
        spec: SourceSpec,
        on_ended: EndedCallback,
    ) -> Result<SourceId, AudioDeviceError> {
        self.device.start_source(spec, on_ended)
    }

    pub fn stop_source(&self, id: SourceId) {
        self.device.stop_source(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::audio::ManualAudioDevice;

    #[test]
    fn test_unavailable_device_is_fatal() {
        let device = Arc::new(ManualAudioDevice::unavailable());
        let result = AudioClock::new(device, DEFAULT_GAIN);
        assert!(matches!(result, Err(AudioDeviceError::Unavailable(_))));
    }

    #[test]
    fn test_gain_applied_to_device() {
        let device = Arc::new(ManualAudioDevice::new());
        let clock = AudioClock::new(device.clone(), DEFAULT_GAIN).unwrap();
        assert_eq!(clock.gain(), 2.0);
        assert_eq!(device.gain(), 2.0);
    }

    #[tokio::test]
    async fn test_suspend_resume_idempotent() {
        let device = Arc::new(ManualAudioDevice::new());
        let clock = AudioClock::new(device.clone(), DEFAULT_GAIN).unwrap();

        // 运行中 resume 是空操作
        clock.resume().await.unwrap();
        assert!(!clock.is_suspended());

        device.advance(1.0);
        clock.suspend().await.unwrap();
        clock.suspend().await.unwrap();
        assert!(clock.is_suspended());

        device.advance(5.0);
        assert_eq!(clock.now(), 1.0);

        clock.resume().await.unwrap();
        clock.resume().await.unwrap();
        device.advance(0.5);
        assert_eq!(clock.now(), 1.5);
    }
}
