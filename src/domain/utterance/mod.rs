//! Utterance Context - 朗读请求限界上下文
//!
//! 职责:
//! - 朗读请求的创建与校验
//! - 请求身份 (text, voice, speed) 与缓存键
//! - 合成引擎类型

mod errors;
mod request;
mod value_objects;

pub use errors::UtteranceError;
pub use request::UtteranceRequest;
pub use value_objects::{CacheKey, EngineKind, RequestKey, Speed, SynthesisMode, Voice, DEFAULT_VOICE};
