//! HTTP Handlers

mod ping;
mod playback;
mod queue;
mod settings;
mod websocket;

pub use ping::*;
pub use playback::*;
pub use queue::*;
pub use settings::*;
pub use websocket::*;
