//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml / config.local.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, AudioBackend};
use crate::domain::{Speed, Voice};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 环境变量前缀
const ENV_PREFIX: &str = "SPEAKLINE";

/// 加载应用配置
///
/// # 环境变量示例
/// - `SPEAKLINE_SERVER__PORT=8080`
/// - `SPEAKLINE_TTS__URL=http://tts-server:8000`
/// - `SPEAKLINE_PLAYBACK__MODE=hybrid`
/// - `SPEAKLINE_AUDIO__GAIN=1.5`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// `config_path` 为 None 时搜索默认配置文件（均可缺省）
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 5070)?
        .set_default("server.max_body_bytes", 1024 * 1024)?
        .set_default("tts.engine", "remote")?
        .set_default("tts.url", "http://localhost:8000")?
        .set_default("tts.timeout_secs", 120)?
        .set_default("tts.max_retries", 0)?
        .set_default("tts.stream_idle_secs", 30)?
        .set_default("audio.backend", AudioBackend::default().as_str())?
        .set_default("audio.gain", 2.0)?
        .set_default("audio.tick_ms", 10)?
        .set_default("audio.default_sample_rate", 24_000)?
        .set_default("playback.mode", "streaming")?
        .set_default("playback.initial_segment_words", 15)?
        .set_default("playback.overlap_words", 3)?
        .set_default("playback.search_window", 10)?
        .set_default("playback.chars_per_second", 15.0)?
        .set_default("playback.poll_interval_ms", 100)?
        .set_default("playback.preload_enabled", true)?
        .set_default("settings.path", "data/settings.json")?
        .set_default("settings.default_voice", "af_sarah")?
        .set_default("settings.default_speed", 1.0)?
        .set_default("settings.queue_enabled", false)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级），层级分隔符为双下划线
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

    if config.server.port == 0 {
        return invalid("Server port cannot be 0");
    }

    if config.server.max_body_bytes == 0 {
        return invalid("Max body size cannot be 0");
    }

    if config.tts.url.is_empty() {
        return invalid("TTS URL cannot be empty");
    }

    if config.tts.stream_idle_secs == 0 {
        return invalid("TTS stream idle timeout cannot be 0");
    }

    if !config.audio.gain.is_finite() || config.audio.gain <= 0.0 {
        return invalid("Audio gain must be positive");
    }

    if config.audio.tick_ms == 0 {
        return invalid("Audio tick cannot be 0");
    }

    if config.audio.default_sample_rate == 0 {
        return invalid("Default sample rate cannot be 0");
    }

    let playback = &config.playback;
    if playback.initial_segment_words == 0 {
        return invalid("Initial segment words cannot be 0");
    }

    if playback.overlap_words >= playback.initial_segment_words {
        return invalid("Overlap words must be smaller than initial segment words");
    }

    if !playback.chars_per_second.is_finite() || playback.chars_per_second <= 0.0 {
        return invalid("Chars per second must be positive");
    }

    if playback.poll_interval_ms == 0 {
        return invalid("Poll interval cannot be 0");
    }

    if config.settings.path.as_os_str().is_empty() {
        return invalid("Settings path cannot be empty");
    }

    Voice::new(config.settings.default_voice.clone())
        .map_err(|e| ConfigError::ValidationError(format!("Default voice: {}", e)))?;
    Speed::new(config.settings.default_speed)
        .map_err(|e| ConfigError::ValidationError(format!("Default speed: {}", e)))?;

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}", config.server.addr());
    tracing::info!("TTS Engine: {:?}", config.tts.engine);
    tracing::info!("TTS URL: {}", config.tts.url);
    tracing::info!("TTS Timeout: {}s", config.tts.timeout_secs);
    tracing::info!("Audio Backend: {}", config.audio.backend.as_str());
    tracing::info!("Audio Gain: {}", config.audio.gain);
    tracing::info!("Synthesis Mode: {}", config.playback.mode.as_str());
    tracing::info!("Preload Enabled: {}", config.playback.preload_enabled);
    tracing::info!("Settings File: {:?}", config.settings.path);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_zero_body_limit() {
        let mut config = AppConfig::default();
        config.server.max_body_bytes = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_empty_tts_url() {
        let mut config = AppConfig::default();
        config.tts.url = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_bad_playback() {
        let mut config = AppConfig::default();
        config.playback.overlap_words = config.playback.initial_segment_words;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.playback.chars_per_second = 0.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_bad_default_settings() {
        let mut config = AppConfig::default();
        config.settings.default_speed = -1.0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = AppConfig::default();
        config.settings.default_voice = "   ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "[server]\nport = 9000\nmax_body_bytes = 4096\n\n[audio]\nbackend = \"headless\"\n\n[playback]\nmode = \"hybrid\"\npreload_enabled = false"
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.max_body_bytes, 4096);
        assert_eq!(config.audio.backend, AudioBackend::Headless);
        assert_eq!(config.playback.mode, crate::domain::SynthesisMode::Hybrid);
        assert!(!config.playback.preload_enabled);
        assert_eq!(config.audio.gain, 2.0);
    }
}
