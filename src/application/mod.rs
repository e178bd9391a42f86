//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（TtsEngine、AudioDevice、AudioDecoder、SettingsStore、PlaybackControl）
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod ports;
pub mod queries;

// Re-exports
pub use commands::{
    // Playback commands
    EnqueueCommand,
    PauseCommand,
    RemoveQueuedCommand,
    RemoveQueuedResponse,
    ResumeCommand,
    SpeakCommand,
    SpeakResponse,
    StopCommand,
    StopResponse,
    // Settings commands
    UpdateSettingsCommand,
    // Handlers
    handlers::{
        EnqueueHandler, PauseHandler, RemoveQueuedHandler, ResumeHandler, SpeakHandler,
        StopHandler, UpdateSettingsHandler,
    },
};

pub use error::ApplicationError;

pub use ports::{
    Admission, AudioDecoderPort, AudioDevicePort, PlaybackControlPort, PlaybackError,
    PlaybackSettings, PlaybackSnapshot, PlaybackState, SettingsError, SettingsStorePort,
    TtsEnginePort, TtsError,
};

pub use queries::{
    GetPlaybackState,
    GetSettings,
    // Handlers
    handlers::{GetPlaybackStateHandler, GetSettingsHandler},
};
