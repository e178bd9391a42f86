//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audio_decoder;
mod audio_device;
mod playback_control;
mod settings_store;
mod tts_engine;

pub use audio_decoder::{AudioDecoderPort, DecodeError};
pub use audio_device::{
    AudioDeviceError, AudioDevicePort, DeviceState, EndedCallback, SourceId, SourceSpec,
};
pub use playback_control::{
    Admission, PlaybackControlPort, PlaybackError, PlaybackSnapshot, PlaybackState, QueuedItem,
};
pub use settings_store::{PlaybackSettings, SettingsError, SettingsStorePort};
pub use tts_engine::{
    AudioPayload, ChunkStream, StreamChunk, StreamRequest, SynthesisRequest, SynthesizedAudio,
    TtsEnginePort, TtsError,
};
