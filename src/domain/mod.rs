//! Domain Layer - 领域层
//!
//! - Utterance Context: 朗读请求与身份
//! - 解码后的音频片段
//! - 进度与时长估计
//! - 文本切分

pub mod utterance;

mod progress;
mod segment;
mod text_splitter;

pub use progress::{estimate_duration, ProgressSnapshot, ProgressTracker, DEFAULT_CHARS_PER_SECOND};
pub use segment::DecodedSegment;
pub use text_splitter::{
    split_for_hybrid, tokenize_for_streaming, word_count, words, HybridSplit, HybridSplitConfig,
};
pub use utterance::{
    CacheKey, EngineKind, RequestKey, Speed, SynthesisMode, UtteranceError, UtteranceRequest, Voice,
    DEFAULT_VOICE,
};
