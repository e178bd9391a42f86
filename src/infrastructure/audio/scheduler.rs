//! Segment Scheduler - 无缝排播解码片段
//!
//! 维护播放游标与活动音源集合。同一时刻只有一个有效的 `PlaybackLease`，
//! `stop_all` 或新的 `begin` 会使旧租约失效，之后旧会话的排播请求全部被拒绝。
//! 活动音源集合为空是播放完毕的唯一依据。

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use super::clock::AudioClock;
use crate::application::ports::{AudioDeviceError, SourceId, SourceSpec};
use crate::domain::DecodedSegment;

/// 排播错误
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Playback lease revoked")]
    LeaseRevoked,

    #[error("Invalid playback rate: {0}")]
    InvalidRate(f64),

    #[error("Audio device error: {0}")]
    Device(#[from] AudioDeviceError),
}

/// 时间轴使用权
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackLease {
    generation: u64,
}

/// 一次排播的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSegment {
    pub source_id: SourceId,
    pub start_at: f64,
    pub end_at: f64,
}

struct SchedulerState {
    generation: u64,
    cursor: Option<f64>,
    active: HashSet<SourceId>,
}

struct Inner {
    state: Mutex<SchedulerState>,
    active_count: watch::Sender<usize>,
}

impl Inner {
    fn source_ended(&self, id: SourceId) {
        let mut state = self.state.lock();
        if state.active.remove(&id) {
            self.active_count.send_replace(state.active.len());
        }
    }
}

pub struct SegmentScheduler {
    clock: Arc<AudioClock>,
    inner: Arc<Inner>,
}

impl SegmentScheduler {
    pub fn new(clock: Arc<AudioClock>) -> Self {
        let (active_count, _) = watch::channel(0);
        Self {
            clock,
            inner: Arc::new(Inner {
                state: Mutex::new(SchedulerState {
                    generation: 0,
                    cursor: None,
                    active: HashSet::new(),
                }),
                active_count,
            }),
        }
    }

    pub fn clock(&self) -> &Arc<AudioClock> {
        &self.clock
    }

    /// 为新的朗读占用时间轴，清空游标，旧租约失效
    pub fn begin(&self) -> PlaybackLease {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        state.cursor = None;
        PlaybackLease {
            generation: state.generation,
        }
    }

    pub fn is_current(&self, lease: &PlaybackLease) -> bool {
        self.inner.state.lock().generation == lease.generation
    }

    /// 将游标重置到当前时钟时间
    pub fn restart_cursor(&self, lease: &PlaybackLease) -> Result<f64, ScheduleError> {
        let mut state = self.inner.state.lock();
        if state.generation != lease.generation {
            return Err(ScheduleError::LeaseRevoked);
        }
        let now = self.clock.now();
        state.cursor = Some(now);
        Ok(now)
    }

    /// 排播一个片段
    ///
    /// 游标未设置时取当前时钟；游标落后于时钟时对齐到当前时钟。
    /// 启动后游标前进 `duration / playback_rate`。整个过程持锁完成。
    pub fn schedule_segment(
        &self,
        lease: &PlaybackLease,
        segment: &DecodedSegment,
        playback_rate: f64,
    ) -> Result<ScheduledSegment, ScheduleError> {
        if !playback_rate.is_finite() || playback_rate <= 0.0 {
            return Err(ScheduleError::InvalidRate(playback_rate));
        }

        let mut state = self.inner.state.lock();
        if state.generation != lease.generation {
            return Err(ScheduleError::LeaseRevoked);
        }

        let now = self.clock.now();
        let start_at = match state.cursor {
            Some(cursor) if cursor >= now => cursor,
            Some(cursor) => {
                tracing::debug!(cursor, now, "Playback cursor fell behind clock, snapping forward");
                now
            }
            None => now,
        };

        let inner = Arc::downgrade(&self.inner);
        let source_id = self.clock.start_source(
            SourceSpec {
                segment: segment.clone(),
                start_at,
                playback_rate,
            },
            Box::new(move |id| {
                if let Some(inner) = inner.upgrade() {
                    inner.source_ended(id);
                }
            }),
        )?;

        let end_at = start_at + segment.playback_secs(playback_rate);
        state.active.insert(source_id);
        state.cursor = Some(end_at);
        self.inner.active_count.send_replace(state.active.len());

        tracing::trace!(source_id, start_at, end_at, "Segment scheduled");

        Ok(ScheduledSegment {
            source_id,
            start_at,
            end_at,
        })
    }

    /// 停止全部活动音源，清空集合与游标，所有租约失效
    ///
    /// 返回被停止的音源数
    pub fn stop_all(&self) -> usize {
        let stopped: Vec<SourceId> = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.cursor = None;
            let drained = state.active.drain().collect();
            self.inner.active_count.send_replace(0);
            drained
        };

        for id in &stopped {
            self.clock.stop_source(*id);
        }

        if !stopped.is_empty() {
            tracing::debug!(count = stopped.len(), "Stopped active sources");
        }
        stopped.len()
    }

    pub fn is_drained(&self) -> bool {
        self.inner.state.lock().active.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    /// 下一个片段的计划开始时间
    pub fn cursor(&self) -> Option<f64> {
        self.inner.state.lock().cursor
    }

    /// 等待活动音源集合变空
    pub async fn wait_drained(&self) {
        let mut rx = self.inner.active_count.subscribe();
        // 发送端由 self 持有，不会关闭
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// 订阅活动音源数量变化
    pub fn subscribe_active(&self) -> watch::Receiver<usize> {
        self.inner.active_count.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::audio::{ManualAudioDevice, DEFAULT_GAIN};

    fn setup() -> (Arc<ManualAudioDevice>, SegmentScheduler) {
        let device = Arc::new(ManualAudioDevice::new());
        let clock = Arc::new(AudioClock::new(device.clone(), DEFAULT_GAIN).unwrap());
        (device, SegmentScheduler::new(clock))
    }

    fn segment(secs: f64) -> DecodedSegment {
        DecodedSegment::new(vec![0.0; (secs * 1000.0).round() as usize], 1000)
    }

    #[test]
    fn test_segments_scheduled_back_to_back() {
        let (device, scheduler) = setup();
        device.advance(0.25);
        let lease = scheduler.begin();

        let durations = [0.5, 1.25, 0.75, 2.0];
        for d in durations {
            scheduler.schedule_segment(&lease, &segment(d), 1.0).unwrap();
        }

        let started = device.started_sources();
        let mut expected = 0.25;
        for (source, d) in started.iter().zip(durations) {
            assert!((source.start_at - expected).abs() < 1e-9);
            expected += d;
        }
        assert!((scheduler.cursor().unwrap() - expected).abs() < 1e-9);
        assert_eq!(scheduler.active_count(), 4);
    }

    #[test]
    fn test_stalled_cursor_snaps_to_now() {
        let (device, scheduler) = setup();
        let lease = scheduler.begin();

        scheduler.schedule_segment(&lease, &segment(1.0), 1.0).unwrap();
        // 模拟卡顿：时钟越过游标
        device.advance(3.0);
        let scheduled = scheduler.schedule_segment(&lease, &segment(1.0), 1.0).unwrap();

        assert_eq!(scheduled.start_at, 3.0);
        assert_eq!(scheduler.cursor(), Some(4.0));
    }

    #[test]
    fn test_playback_rate_scales_cursor() {
        let (_device, scheduler) = setup();
        let lease = scheduler.begin();
        let scheduled = scheduler.schedule_segment(&lease, &segment(3.0), 1.5).unwrap();
        assert!((scheduled.end_at - 2.0).abs() < 1e-9);
        assert!(matches!(
            scheduler.schedule_segment(&lease, &segment(1.0), 0.0),
            Err(ScheduleError::InvalidRate(_))
        ));
    }

    #[test]
    fn test_stop_all_drains_immediately() {
        let (device, scheduler) = setup();
        let lease = scheduler.begin();
        for _ in 0..5 {
            scheduler.schedule_segment(&lease, &segment(1.0), 1.0).unwrap();
        }
        // 第一个已自然结束
        device.advance(1.0);
        assert_eq!(scheduler.active_count(), 4);

        assert_eq!(scheduler.stop_all(), 4);
        assert!(scheduler.is_drained());
        assert_eq!(scheduler.cursor(), None);
        assert_eq!(device.active_sources(), 0);

        // 再次停止是空操作
        assert_eq!(scheduler.stop_all(), 0);
    }

    #[test]
    fn test_revoked_lease_rejected() {
        let (_device, scheduler) = setup();
        let lease = scheduler.begin();
        scheduler.stop_all();

        assert!(!scheduler.is_current(&lease));
        assert!(matches!(
            scheduler.schedule_segment(&lease, &segment(1.0), 1.0),
            Err(ScheduleError::LeaseRevoked)
        ));
        assert!(scheduler.is_drained());

        let next = scheduler.begin();
        assert!(scheduler.schedule_segment(&next, &segment(1.0), 1.0).is_ok());
        let stale = scheduler.begin();
        assert!(matches!(
            scheduler.schedule_segment(&next, &segment(1.0), 1.0),
            Err(ScheduleError::LeaseRevoked)
        ));
        assert!(scheduler.is_current(&stale));
    }

    #[test]
    fn test_natural_end_drains() {
        let (device, scheduler) = setup();
        let lease = scheduler.begin();
        scheduler.schedule_segment(&lease, &segment(0.5), 1.0).unwrap();
        scheduler.schedule_segment(&lease, &segment(0.5), 1.0).unwrap();

        device.advance(0.6);
        assert_eq!(scheduler.active_count(), 1);
        device.advance(0.4);
        assert!(scheduler.is_drained());
    }

    #[tokio::test]
    async fn test_wait_drained_wakes_on_last_source() {
        let (device, scheduler) = setup();
        let scheduler = Arc::new(scheduler);
        let lease = scheduler.begin();
        scheduler.schedule_segment(&lease, &segment(1.0), 1.0).unwrap();

        let waiter = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.wait_drained().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        device.advance(1.0);
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
