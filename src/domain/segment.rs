//! 解码后的音频片段

use std::sync::Arc;

/// 解码后的单声道 PCM 片段
///
/// 样本以引用计数共享，会话与预加载缓存之间复制代价很低
#[derive(Debug, Clone)]
pub struct DecodedSegment {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl DecodedSegment {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// 时长（秒）
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// 以指定播放速率播放时占用的时间轴长度
    pub fn playback_secs(&self, playback_rate: f64) -> f64 {
        if playback_rate <= 0.0 {
            return self.duration_secs();
        }
        self.duration_secs() / playback_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_sample_count() {
        let segment = DecodedSegment::new(vec![0.0; 24_000], 24_000);
        assert!((segment.duration_secs() - 1.0).abs() < 1e-9);
        assert!((segment.playback_secs(2.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_clone_shares_samples() {
        let segment = DecodedSegment::new(vec![0.5; 10], 10);
        let copy = segment.clone();
        assert!(std::ptr::eq(segment.samples().as_ptr(), copy.samples().as_ptr()));
    }
}
