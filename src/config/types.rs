//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;

use crate::domain::SynthesisMode;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// TTS 引擎配置
    #[serde(default)]
    pub tts: TtsConfig,

    /// 音频输出配置
    #[serde(default)]
    pub audio: AudioConfig,

    /// 播放调度配置
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// 用户设置存储
    #[serde(default)]
    pub settings: SettingsConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 请求体大小上限（字节）
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5070
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TTS 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsBackend {
    /// HTTP TTS 服务
    #[default]
    Remote,
    /// 本地生成正弦波，用于离线调试
    Fake,
}

/// TTS 引擎配置
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub engine: TtsBackend,

    /// TTS 服务基础 URL
    #[serde(default = "default_tts_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,

    /// 最大重试次数
    #[serde(default)]
    pub max_retries: u32,

    /// 流式响应两行之间的最长等待（秒）
    #[serde(default = "default_stream_idle_secs")]
    pub stream_idle_secs: u64,
}

fn default_tts_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_tts_timeout() -> u64 {
    120
}

fn default_stream_idle_secs() -> u64 {
    30
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: TtsBackend::default(),
            url: default_tts_url(),
            timeout_secs: default_tts_timeout(),
            max_retries: 0,
            stream_idle_secs: default_stream_idle_secs(),
        }
    }
}

/// 音频输出后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioBackend {
    /// 系统默认输出设备（需要 `cpal-output` feature）
    Output,
    /// 无声输出，按实时节拍推进时钟
    Headless,
}

impl AudioBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::Headless => "headless",
        }
    }
}

impl Default for AudioBackend {
    fn default() -> Self {
        if cfg!(feature = "cpal-output") {
            Self::Output
        } else {
            Self::Headless
        }
    }
}

/// 音频输出配置
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub backend: AudioBackend,

    /// 输出增益
    #[serde(default = "default_gain")]
    pub gain: f32,

    /// headless 后端的时钟步进（毫秒）
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// 流式响应未声明采样率时使用的默认值（Hz）
    #[serde(default = "default_sample_rate")]
    pub default_sample_rate: u32,
}

fn default_gain() -> f32 {
    2.0
}

fn default_tick_ms() -> u64 {
    10
}

fn default_sample_rate() -> u32 {
    24_000
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            backend: AudioBackend::default(),
            gain: default_gain(),
            tick_ms: default_tick_ms(),
            default_sample_rate: default_sample_rate(),
        }
    }
}

/// 播放调度配置
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    /// 合成模式: whole, streaming, hybrid
    #[serde(default)]
    pub mode: SynthesisMode,

    /// hybrid 模式首段目标词数
    #[serde(default = "default_initial_segment_words")]
    pub initial_segment_words: usize,

    /// hybrid 模式重叠去重词数
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,

    /// hybrid 模式切分点搜索窗口（词）
    #[serde(default = "default_search_window")]
    pub search_window: usize,

    /// 1.0x 语速下每秒字符数（时长估计）
    #[serde(default = "default_chars_per_second")]
    pub chars_per_second: f64,

    /// 进度推送间隔（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// 是否预加载队首请求
    #[serde(default = "default_preload_enabled")]
    pub preload_enabled: bool,
}

fn default_initial_segment_words() -> usize {
    15
}

fn default_overlap_words() -> usize {
    3
}

fn default_search_window() -> usize {
    10
}

fn default_chars_per_second() -> f64 {
    15.0
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_preload_enabled() -> bool {
    true
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            mode: SynthesisMode::default(),
            initial_segment_words: default_initial_segment_words(),
            overlap_words: default_overlap_words(),
            search_window: default_search_window(),
            chars_per_second: default_chars_per_second(),
            poll_interval_ms: default_poll_interval_ms(),
            preload_enabled: default_preload_enabled(),
        }
    }
}

/// 用户设置存储配置
///
/// default_* 仅在设置文件不存在时生效
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_settings_path")]
    pub path: PathBuf,

    #[serde(default = "default_voice")]
    pub default_voice: String,

    #[serde(default = "default_speed")]
    pub default_speed: f64,

    #[serde(default)]
    pub queue_enabled: bool,
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("data/settings.json")
}

fn default_voice() -> String {
    "af_sarah".to_string()
}

fn default_speed() -> f64 {
    1.0
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: default_settings_path(),
            default_voice: default_voice(),
            default_speed: default_speed(),
            queue_enabled: false,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5070);
        assert_eq!(config.tts.engine, TtsBackend::Remote);
        assert_eq!(config.server.max_body_bytes, 1024 * 1024);
        assert_eq!(config.tts.stream_idle_secs, 30);
        assert_eq!(config.audio.gain, 2.0);
        assert_eq!(config.playback.mode, SynthesisMode::Streaming);
        assert_eq!(config.playback.initial_segment_words, 15);
        assert_eq!(config.settings.default_voice, "af_sarah");
        assert!(!config.settings.queue_enabled);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"tts": {"engine": "fake"}, "playback": {"mode": "hybrid"}}"#,
        )
        .unwrap();
        assert_eq!(config.tts.engine, TtsBackend::Fake);
        assert_eq!(config.tts.url, "http://localhost:8000");
        assert_eq!(config.playback.mode, SynthesisMode::Hybrid);
        assert_eq!(config.playback.poll_interval_ms, 100);
    }

    #[test]
    fn test_audio_backend_follows_output_feature() {
        let expected = if cfg!(feature = "cpal-output") {
            AudioBackend::Output
        } else {
            AudioBackend::Headless
        };
        assert_eq!(AudioConfig::default().backend, expected);

        let config: AppConfig =
            serde_json::from_str(r#"{"audio": {"backend": "headless"}}"#).unwrap();
        assert_eq!(config.audio.backend, AudioBackend::Headless);
        assert_eq!(config.audio.backend.as_str(), "headless");
    }
}
