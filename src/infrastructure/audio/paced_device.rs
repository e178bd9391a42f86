//! Paced Audio Device - 实时推进的软件输出设备
//!
//! 不向声卡输出，按真实时间推进时钟，音源在其本应播完的时刻触发结束回调。
//! 需要在 tokio runtime 内创建，否则视为设备不可用。

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::timeline::VirtualTimeline;
use crate::application::ports::{
    AudioDeviceError, AudioDevicePort, DeviceState, EndedCallback, SourceId, SourceSpec,
};

pub struct PacedAudioDevice {
    timeline: Arc<VirtualTimeline>,
    ticker: Option<JoinHandle<()>>,
}

impl PacedAudioDevice {
    pub fn new(tick: Duration) -> Self {
        let timeline = Arc::new(VirtualTimeline::new());
        let ticker = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(Self::drive(timeline.clone(), tick))),
            Err(e) => {
                tracing::warn!(error = %e, "No tokio runtime, paced audio device unavailable");
                None
            }
        };

        Self { timeline, ticker }
    }

    async fn drive(timeline: Arc<VirtualTimeline>, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();

        tracing::debug!(tick_ms = tick.as_millis() as u64, "Paced audio clock started");

        loop {
            interval.tick().await;
            let now = Instant::now();
            // 挂起期间 advance 被忽略，last 照常更新，恢复时不会跳变
            timeline.advance(now.duration_since(last).as_secs_f64());
            last = now;
        }
    }
}

impl Drop for PacedAudioDevice {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

#[async_trait]
impl AudioDevicePort for PacedAudioDevice {
    fn is_available(&self) -> bool {
        self.ticker.is_some()
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
        if self.ticker.is_none() {
            return Err(AudioDeviceError::Unavailable("paced clock is not running".to_string()));
        }
        self.timeline.start(spec, on_ended)
    }

    fn stop_source(&self, id: SourceId) {
        self.timeline.stop(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_without_runtime() {
        let device = PacedAudioDevice::new(Duration::from_millis(10));
        assert!(!device.is_available());
    }

    #[tokio::test]
    async fn test_clock_follows_real_time() {
        let device = PacedAudioDevice::new(Duration::from_millis(10));
        assert!(device.is_available());

        tokio::time::sleep(Duration::from_millis(300)).await;
        let now = device.current_time();
        assert!(now > 0.1 && now < 1.5, "clock at {}", now);
    }

    #[tokio::test]
    async fn test_suspend_freezes_clock() {
        let device = PacedAudioDevice::new(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;

        device.suspend().await.unwrap();
        assert_eq!(device.state(), DeviceState::Suspended);
        let frozen = device.current_time();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(device.current_time(), frozen);

        device.resume().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(device.current_time() > frozen);
    }
}
