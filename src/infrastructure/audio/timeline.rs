//! Virtual Timeline - 软件音频时间轴
//!
//! 设备实现的公共核心：维护设备时钟、已启动音源及其结束时间。
//! 时钟有两种推进方式，同一条时间轴只用其中一种：
//! - `advance`: 按秒推进（手动设备、节拍设备），结束回调在锁外触发
//! - `render`: 混音输出若干帧，时钟等于已输出帧数，结束回调交给调用方
//!
//! 挂起期间两种推进都被忽略。

use parking_lot::Mutex;
use std::collections::BTreeMap;

use crate::application::ports::{AudioDeviceError, EndedCallback, SourceId, SourceSpec};
use crate::domain::DecodedSegment;

/// 允许的浮点误差
const TIME_EPSILON: f64 = 1e-9;

/// 已启动音源的记录（用于检查调度结果）
#[derive(Debug, Clone, PartialEq)]
pub struct StartedSource {
    pub id: SourceId,
    pub start_at: f64,
    pub duration_secs: f64,
    pub playback_rate: f64,
}

impl StartedSource {
    pub fn end_at(&self) -> f64 {
        self.start_at + self.duration_secs / self.playback_rate
    }
}

struct ActiveSource {
    segment: DecodedSegment,
    start_at: f64,
    end_at: f64,
    playback_rate: f64,
    on_ended: EndedCallback,
}

impl ActiveSource {
    /// 设备时间 t 处的样本，线性插值；不在播放区间内返回 None
    fn sample_at(&self, t: f64) -> Option<f32> {
        if t < self.start_at || t >= self.end_at {
            return None;
        }
        let samples = self.segment.samples();
        let pos = (t - self.start_at) * self.playback_rate * self.segment.sample_rate() as f64;
        let index = pos as usize;
        let current = *samples.get(index)?;
        let next = samples.get(index + 1).copied().unwrap_or(current);
        let frac = (pos - index as f64) as f32;
        Some(current + (next - current) * frac)
    }
}

/// 自然结束、等待触发回调的音源
pub type EndedSource = (SourceId, EndedCallback);

struct TimelineState {
    now: f64,
    /// `render` 已输出的帧数
    rendered_frames: u64,
    suspended: bool,
    gain: f32,
    next_id: SourceId,
    active: BTreeMap<SourceId, ActiveSource>,
    /// 仅在启用记录时保存
    started: Option<Vec<StartedSource>>,
}

impl TimelineState {
    fn take_finished(&mut self) -> Vec<EndedSource> {
        let now = self.now;
        let finished: Vec<SourceId> = self
            .active
            .iter()
            .filter(|(_, source)| source.end_at <= now + TIME_EPSILON)
            .map(|(id, _)| *id)
            .collect();

        finished
            .into_iter()
            .filter_map(|id| self.active.remove(&id).map(|source| (id, source.on_ended)))
            .collect()
    }
}

pub struct VirtualTimeline {
    state: Mutex<TimelineState>,
}

impl VirtualTimeline {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// 额外记录每个已启动音源，供测试检查排播结果
    ///
    /// 记录只增不减，长期运行的设备不要开启
    pub fn with_source_log() -> Self {
        Self::build(Some(Vec::new()))
    }

    fn build(started: Option<Vec<StartedSource>>) -> Self {
        Self {
            state: Mutex::new(TimelineState {
                now: 0.0,
                rendered_frames: 0,
                suspended: false,
                gain: 1.0,
                next_id: 1,
                active: BTreeMap::new(),
                started,
            }),
        }
    }

    pub fn now(&self) -> f64 {
        self.state.lock().now
    }

    pub fn is_suspended(&self) -> bool {
        self.state.lock().suspended
    }

    pub fn set_suspended(&self, suspended: bool) {
        self.state.lock().suspended = suspended;
    }

    pub fn gain(&self) -> f32 {
        self.state.lock().gain
    }

    pub fn set_gain(&self, gain: f32) {
        self.state.lock().gain = gain;
    }

    pub fn start(&self, spec: SourceSpec, on_ended: EndedCallback) -> Result<SourceId, AudioDeviceError> {
        if !spec.playback_rate.is_finite() || spec.playback_rate <= 0.0 {
            return Err(AudioDeviceError::InvalidSource(format!(
                "playback rate must be positive, got {}",
                spec.playback_rate
            )));
        }
        if !spec.start_at.is_finite() {
            return Err(AudioDeviceError::InvalidSource("start time is not finite".to_string()));
        }

        let mut state = self.state.lock();
        if spec.start_at + TIME_EPSILON < state.now {
            return Err(AudioDeviceError::StartInPast {
                start_at: spec.start_at,
                now: state.now,
            });
        }

        let id = state.next_id;
        state.next_id += 1;

        let record = StartedSource {
            id,
            start_at: spec.start_at,
            duration_secs: spec.segment.duration_secs(),
            playback_rate: spec.playback_rate,
        };
        state.active.insert(
            id,
            ActiveSource {
                end_at: record.end_at(),
                start_at: spec.start_at,
                playback_rate: spec.playback_rate,
                segment: spec.segment,
                on_ended,
            },
        );
        if let Some(started) = state.started.as_mut() {
            started.push(record);
        }

        Ok(id)
    }

    /// 强制停止，不触发回调
    pub fn stop(&self, id: SourceId) -> bool {
        self.state.lock().active.remove(&id).is_some()
    }

    /// 推进时钟，返回本次自然结束的音源数
    pub fn advance(&self, secs: f64) -> usize {
        if secs < 0.0 || !secs.is_finite() {
            return 0;
        }

        let ended = {
            let mut state = self.state.lock();
            if state.suspended {
                return 0;
            }
            state.now += secs;
            state.take_finished()
        };

        let count = ended.len();
        for (id, on_ended) in ended {
            on_ended(id);
        }
        count
    }

    /// 混音输出一块交错样本并按输出帧数推进时钟
    ///
    /// `out` 长度应为 `channels` 的整数倍。单声道音源复制到所有声道，
    /// 按采样率比与播放速率重采样并乘以增益。返回本块内自然结束的音源，
    /// 回调由调用方在音频线程之外执行。
    pub fn render(&self, out: &mut [f32], channels: usize, sample_rate: u32) -> Vec<EndedSource> {
        out.fill(0.0);
        if channels == 0 || sample_rate == 0 {
            return Vec::new();
        }

        let mut state = self.state.lock();
        if state.suspended {
            return Vec::new();
        }

        let frames = out.len() / channels;
        let base = state.rendered_frames;
        let rate = sample_rate as f64;
        let gain = state.gain;
        let (block_start, block_end) = (base as f64 / rate, (base + frames as u64) as f64 / rate);

        for source in state.active.values() {
            if source.start_at >= block_end || source.end_at <= block_start {
                continue;
            }
            for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
                let t = (base + i as u64) as f64 / rate;
                if let Some(sample) = source.sample_at(t) {
                    let sample = sample * gain;
                    for slot in frame.iter_mut() {
                        *slot += sample;
                    }
                }
            }
        }
        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        state.rendered_frames = base + frames as u64;
        state.now = state.rendered_frames as f64 / rate;
        state.take_finished()
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// 已启动音源记录，未启用记录时为空
    pub fn started_sources(&self) -> Vec<StartedSource> {
        self.state.lock().started.clone().unwrap_or_default()
    }
}

impl Default for VirtualTimeline {
    fn default() -> Self {
        Self::new()
    }
}
