//! Utterance Context - Value Objects

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use super::UtteranceError;

/// 默认音色
pub const DEFAULT_VOICE: &str = "af_sarah";

/// 音色标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Voice(String);

impl Voice {
    pub fn new(name: impl Into<String>) -> Result<Self, UtteranceError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.len() > 64 {
            return Err(UtteranceError::InvalidVoice(name));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self(DEFAULT_VOICE.to_string())
    }
}

impl TryFrom<String> for Voice {
    type Error = UtteranceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 语速倍率
///
/// 不变量: 有限正数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Speed(f64);

impl Speed {
    pub const NORMAL: Speed = Speed(1.0);

    pub fn new(value: f64) -> Result<Self, UtteranceError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(UtteranceError::InvalidSpeed(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for Speed {
    fn default() -> Self {
        Self::NORMAL
    }
}

// 构造时已排除 NaN，按位比较即可
impl Eq for Speed {}

impl Hash for Speed {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl TryFrom<f64> for Speed {
    type Error = UtteranceError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Speed> for f64 {
    fn from(speed: Speed) -> Self {
        speed.0
    }
}

impl std::fmt::Display for Speed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 合成引擎类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// 远端 TTS 服务
    #[default]
    Remote,
    /// 本地模型
    OnDevice,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::OnDevice => "on_device",
        }
    }
}

/// 合成方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    /// 整段合成，一次排播
    Whole,
    /// 逐词输入流式合成，逐块排播
    #[default]
    Streaming,
    /// 先流式合成开头一小段，再合成其余部分
    Hybrid,
}

impl SynthesisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whole => "whole",
            Self::Streaming => "streaming",
            Self::Hybrid => "hybrid",
        }
    }
}

/// 请求身份 (text, voice, speed)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub text: String,
    pub voice: Voice,
    pub speed: Speed,
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}|{}", self.text, self.voice, self.speed)
    }
}

/// 预加载缓存键
///
/// 同一请求在不同引擎下的音频互不复用
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub request: RequestKey,
    pub engine: EngineKind,
}

impl CacheKey {
    pub fn new(request: RequestKey, engine: EngineKind) -> Self {
        Self { request, engine }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.engine {
            EngineKind::Remote => write!(f, "{}", self.request),
            EngineKind::OnDevice => write!(f, "{}|clientside", self.request),
        }
    }
}
