//! Fake TTS Client - 用于测试与离线运行的 TTS 客户端
//!
//! 不调用任何服务，按文本长度生成确定性的正弦音：
//! 时长 = 字符数 / chars_per_second / speed。流式接口每凑满一句输出一块。

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::infrastructure::adapters::decoder::encode_wav;
use crate::application::ports::{
    AudioPayload, ChunkStream, StreamChunk, StreamRequest, SynthesisRequest, SynthesizedAudio,
    TtsEnginePort, TtsError,
};
use crate::domain::EngineKind;

/// Fake TTS Client 配置
#[derive(Debug, Clone)]
pub struct FakeTtsClientConfig {
    /// 输出采样率
    pub sample_rate: u32,
    /// 1.0x 语速下每秒字符数
    pub chars_per_second: f64,
    /// 每次合成/每块输出的模拟延迟
    pub latency_ms: u64,
    /// 报告的引擎类型
    pub kind: EngineKind,
    /// 流式输出 N 块后返回错误
    pub fail_stream_after: Option<usize>,
    /// 流式块不携带对应文本
    pub omit_chunk_text: bool,
}

impl Default for FakeTtsClientConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            chars_per_second: 15.0,
            latency_ms: 0,
            kind: EngineKind::Remote,
            fail_stream_after: None,
            omit_chunk_text: false,
        }
    }
}

/// Fake TTS Client
pub struct FakeTtsClient {
    config: FakeTtsClientConfig,
    failing: AtomicBool,
    synthesize_calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

impl FakeTtsClient {
    /// 创建新的 FakeTtsClient
    pub fn new(config: FakeTtsClientConfig) -> Self {
        tracing::info!(
            sample_rate = config.sample_rate,
            chars_per_second = config.chars_per_second,
            latency_ms = config.latency_ms,
            kind = config.kind.as_str(),
            "FakeTtsClient initialized"
        );
        Self {
            config,
            failing: AtomicBool::new(false),
            synthesize_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
        }
    }

    /// 使用默认配置创建
    pub fn with_defaults() -> Self {
        Self::new(FakeTtsClientConfig::default())
    }

    /// 之后的合成调用全部失败
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn synthesize_calls(&self) -> usize {
        self.synthesize_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// 文本在给定语速下的合成时长（秒）
    pub fn expected_duration(&self, text: &str, speed: f64) -> f64 {
        let frames = tone_frames(text, speed, &self.config);
        frames as f64 / self.config.sample_rate as f64
    }
}

fn tone_frames(text: &str, speed: f64, config: &FakeTtsClientConfig) -> usize {
    let chars = text.trim().chars().count() as f64;
    let secs = chars / config.chars_per_second / speed.max(f64::EPSILON);
    (secs * config.sample_rate as f64).round() as usize
}

fn tone(text: &str, speed: f64, config: &FakeTtsClientConfig) -> Vec<f32> {
    let frames = tone_frames(text, speed, config);
    let step = 2.0 * std::f32::consts::PI * 220.0 / config.sample_rate as f32;
    (0..frames).map(|i| (i as f32 * step).sin() * 0.2).collect()
}

fn to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|s| ((s.clamp(-1.0, 1.0) * 32767.0) as i16).to_le_bytes())
        .collect()
}

fn ends_sentence(token: &str) -> bool {
    token
        .trim_end()
        .ends_with(['.', '!', '?', '。', '！', '？'])
}

struct StreamState {
    input: mpsc::Receiver<String>,
    buffer: String,
    emitted: usize,
    done: bool,
    speed: f64,
    config: FakeTtsClientConfig,
}

impl StreamState {
    /// 读取输入直到凑满一句或输入结束
    async fn next_sentence(&mut self) -> Option<String> {
        loop {
            match self.input.recv().await {
                Some(token) => {
                    let complete = ends_sentence(&token);
                    self.buffer.push_str(&token);
                    if complete {
                        return Some(std::mem::take(&mut self.buffer));
                    }
                }
                None => {
                    self.done = true;
                    let rest = std::mem::take(&mut self.buffer);
                    return if rest.trim().is_empty() { None } else { Some(rest) };
                }
            }
        }
    }
}

#[async_trait]
impl TtsEnginePort for FakeTtsClient {
    fn kind(&self) -> EngineKind {
        self.config.kind
    }

    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesizedAudio, TtsError> {
        self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            text_len = request.text.len(),
            voice = %request.voice,
            speed = request.speed.value(),
            "FakeTtsClient: synthesizing tone"
        );

        // 模拟推理延迟
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(TtsError::ServiceError("fake engine failure".to_string()));
        }

        let samples = tone(&request.text, request.speed.value(), &self.config);
        let duration_ms = (samples.len() as u64 * 1000) / self.config.sample_rate as u64;

        Ok(SynthesizedAudio {
            audio: AudioPayload::Wav(encode_wav(&samples, self.config.sample_rate)),
            duration_ms: Some(duration_ms),
        })
    }

    async fn synthesize_stream(&self, request: StreamRequest) -> Result<ChunkStream, TtsError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(TtsError::ServiceError("fake engine failure".to_string()));
        }

        let state = StreamState {
            input: request.input,
            buffer: String::new(),
            emitted: 0,
            done: false,
            speed: request.speed.value(),
            config: self.config.clone(),
        };

        let stream = stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }

            if let Some(limit) = state.config.fail_stream_after {
                if state.emitted >= limit {
                    state.done = true;
                    return Some((
                        Err(TtsError::ServiceError("fake stream failure".to_string())),
                        state,
                    ));
                }
            }

            let sentence = state.next_sentence().await?;

            if state.config.latency_ms > 0 {
                tokio::time::sleep(Duration::from_millis(state.config.latency_ms)).await;
            }

            let samples = tone(&sentence, state.speed, &state.config);
            state.emitted += 1;
            let text = if state.config.omit_chunk_text {
                String::new()
            } else {
                sentence.trim().to_string()
            };
            let chunk = StreamChunk {
                text,
                audio: AudioPayload::Pcm16 {
                    data: to_pcm16(&samples),
                    sample_rate: state.config.sample_rate,
                },
            };
            Some((Ok(chunk), state))
        });

        Ok(stream.boxed())
    }

    async fn health_check(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }
}
