//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod decoder;
pub mod settings;
pub mod tts;

pub use decoder::*;
pub use settings::*;
pub use tts::*;
