//! TTS Engine Port - 语音合成引擎抽象
//!
//! 定义整段合成与流式合成两种接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{EngineKind, Speed, Voice};

/// TTS 错误
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Voice not found: {0}")]
    VoiceNotFound(String),
}

/// 引擎返回的音频数据
#[derive(Debug, Clone, PartialEq)]
pub enum AudioPayload {
    /// 完整 WAV 文件
    Wav(Vec<u8>),
    /// 裸 PCM16 小端单声道
    Pcm16 { data: Vec<u8>, sample_rate: u32 },
}

impl AudioPayload {
    pub fn len(&self) -> usize {
        match self {
            Self::Wav(data) => data.len(),
            Self::Pcm16 { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 整段合成请求
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: Voice,
    pub speed: Speed,
}

/// 整段合成结果
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub audio: AudioPayload,
    /// 服务端报告的时长（毫秒）
    pub duration_ms: Option<u64>,
}

/// 流式合成请求
///
/// 文本以分词形式逐个送入 `input`，发送端关闭即表示输入结束
#[derive(Debug)]
pub struct StreamRequest {
    pub voice: Voice,
    pub speed: Speed,
    pub input: mpsc::Receiver<String>,
}

/// 流式合成输出块
#[derive(Debug, Clone)]
pub struct StreamChunk {
    /// 本块对应的文本
    pub text: String,
    pub audio: AudioPayload,
}

pub type ChunkStream = BoxStream<'static, Result<StreamChunk, TtsError>>;

/// TTS Engine Port
///
/// 每次调用都可以携带不同的 voice / speed
#[async_trait]
pub trait TtsEnginePort: Send + Sync {
    /// 引擎类型（参与预加载缓存键）
    fn kind(&self) -> EngineKind;

    /// 整段合成
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesizedAudio, TtsError>;

    /// 流式合成
    ///
    /// 返回的流在所有输入消费完毕、最后一块输出后结束
    async fn synthesize_stream(&self, request: StreamRequest) -> Result<ChunkStream, TtsError>;

    /// 检查 TTS 服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
