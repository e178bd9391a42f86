//! 播放进度与时长估计

use serde::Serialize;
use uuid::Uuid;

/// 默认语速启发值（字符/秒，1.0x）
pub const DEFAULT_CHARS_PER_SECOND: f64 = 15.0;

/// 根据文本长度估计 1.0x 语速下的朗读时长（秒）
pub fn estimate_duration(text: &str, chars_per_second: f64) -> f64 {
    if chars_per_second <= 0.0 {
        return 0.0;
    }
    text.chars().count() as f64 / chars_per_second
}

/// 进度快照
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub utterance_id: Uuid,
    pub elapsed_secs: f64,
    pub total_secs: f64,
    pub is_provisional: bool,
    pub percent: f64,
}

/// 单个朗读的进度追踪
///
/// 时间以音频时钟为准。首个音频片段开始播放前 elapsed 为 0；
/// total 在合成全部结束前都是估计值。
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    utterance_id: Uuid,
    started_at: Option<f64>,
    total_secs: f64,
    is_provisional: bool,
    finished: bool,
}

impl ProgressTracker {
    /// 以估计时长创建（playback_speed 为最终播放倍率）
    pub fn with_estimate(utterance_id: Uuid, estimated_secs: f64, playback_speed: f64) -> Self {
        let total_secs = if playback_speed > 0.0 {
            estimated_secs / playback_speed
        } else {
            estimated_secs
        };
        Self {
            utterance_id,
            started_at: None,
            total_secs,
            is_provisional: true,
            finished: false,
        }
    }

    pub fn utterance_id(&self) -> Uuid {
        self.utterance_id
    }

    /// 首个片段就绪时记录进度条起点
    pub fn mark_started(&mut self, clock_time: f64) {
        if self.started_at.is_none() {
            self.started_at = Some(clock_time);
        }
    }

    pub fn started_at(&self) -> Option<f64> {
        self.started_at
    }

    /// 用实测数据修正总时长
    pub fn refine(&mut self, total_secs: f64, is_provisional: bool) {
        if !self.is_provisional {
            return;
        }
        self.total_secs = total_secs.max(0.0);
        self.is_provisional = is_provisional;
    }

    /// 播放结束，进度固定为 100%
    pub fn finish(&mut self) {
        self.is_provisional = false;
        self.finished = true;
    }

    pub fn is_provisional(&self) -> bool {
        self.is_provisional
    }

    pub fn total_secs(&self) -> f64 {
        self.total_secs
    }

    pub fn snapshot(&self, clock_time: f64) -> ProgressSnapshot {
        let elapsed_secs = match self.started_at {
            Some(start) => (clock_time - start).max(0.0),
            None => 0.0,
        };

        let percent = if self.finished {
            100.0
        } else if self.total_secs > 0.0 {
            (elapsed_secs / self.total_secs * 100.0).min(100.0)
        } else {
            0.0
        };

        let elapsed_secs = if self.finished {
            elapsed_secs.max(self.total_secs)
        } else {
            elapsed_secs
        };

        ProgressSnapshot {
            utterance_id: self.utterance_id,
            elapsed_secs,
            total_secs: self.total_secs,
            is_provisional: self.is_provisional,
            percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_duration() {
        assert!((estimate_duration("Hello, world. This is a test.", 15.0) - 29.0 / 15.0).abs() < 1e-9);
        assert_eq!(estimate_duration("abc", 0.0), 0.0);
    }

    #[test]
    fn test_estimate_scaled_by_speed() {
        let tracker = ProgressTracker::with_estimate(Uuid::new_v4(), 10.0, 2.0);
        assert!((tracker.total_secs() - 5.0).abs() < 1e-9);
        assert!(tracker.is_provisional());
    }

    #[test]
    fn test_percent_clamped_at_hundred() {
        let mut tracker = ProgressTracker::with_estimate(Uuid::new_v4(), 2.0, 1.0);
        tracker.mark_started(1.0);

        let half = tracker.snapshot(2.0);
        assert!((half.percent - 50.0).abs() < 1e-9);

        let over = tracker.snapshot(10.0);
        assert_eq!(over.percent, 100.0);
    }

    #[test]
    fn test_elapsed_zero_before_start() {
        let tracker = ProgressTracker::with_estimate(Uuid::new_v4(), 2.0, 1.0);
        let snapshot = tracker.snapshot(5.0);
        assert_eq!(snapshot.elapsed_secs, 0.0);
        assert_eq!(snapshot.percent, 0.0);
    }

    #[test]
    fn test_refine_stops_after_final() {
        let mut tracker = ProgressTracker::with_estimate(Uuid::new_v4(), 2.0, 1.0);
        tracker.refine(3.0, true);
        assert!(tracker.is_provisional());
        tracker.refine(4.0, false);
        assert!(!tracker.is_provisional());
        tracker.refine(9.0, true);
        assert_eq!(tracker.total_secs(), 4.0);
    }

    #[test]
    fn test_finish_reports_full_progress() {
        let mut tracker = ProgressTracker::with_estimate(Uuid::new_v4(), 2.0, 1.0);
        tracker.mark_started(0.0);
        tracker.finish();
        let snapshot = tracker.snapshot(1.0);
        assert_eq!(snapshot.percent, 100.0);
        assert!(!snapshot.is_provisional);
    }
}
