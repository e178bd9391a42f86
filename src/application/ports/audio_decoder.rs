//! Audio Decoder Port - 音频解码抽象

use async_trait::async_trait;
use thiserror::Error;

use super::AudioPayload;
use crate::domain::DecodedSegment;

/// 解码错误
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Empty audio payload")]
    EmptyInput,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Audio Decoder Port
///
/// 将引擎返回的音频字节解码为单声道 f32 PCM
#[async_trait]
pub trait AudioDecoderPort: Send + Sync {
    async fn decode(&self, audio: &AudioPayload) -> Result<DecodedSegment, DecodeError>;
}
