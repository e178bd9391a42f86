//! Speakline - 流式 TTS 朗读播放器
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - 朗读请求、语速/音色值对象、文本切分、进度追踪
//!
//! 应用层 (application/):
//! - Ports: TtsEngine, AudioDevice, AudioDecoder, SettingsStore, PlaybackControl
//! - Commands / Queries: CQRS 命令与查询处理器
//!
//! 基础设施层 (infrastructure/):
//! - Audio: 音频时钟、片段调度器、输出设备
//! - Worker: 合成会话、播放器
//! - Memory: 预加载缓存、请求队列
//! - Adapters: TTS Client, WAV 解码, 设置文件
//! - HTTP: RESTful API + WebSocket
//! - Events: 播放事件发布

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
