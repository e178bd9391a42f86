//! TTS Adapter - TTS 引擎客户端实现

mod fake_tts_client;
mod http_tts_client;
#[cfg(test)]
pub(crate) mod local_tts_server;

pub use fake_tts_client::{FakeTtsClient, FakeTtsClientConfig};
pub use http_tts_client::*;
