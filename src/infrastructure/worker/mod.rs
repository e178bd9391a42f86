//! Worker Layer - Background Task Processing
//!
//! - SynthesisSession: 单个朗读的合成与排播
//! - PlayerWorker: 播放编排 actor

mod player;
mod synthesis_session;

pub use player::{PlayerConfig, PlayerHandle, PlayerWorker};
pub(crate) use synthesis_session::spawn_token_feeder;
pub use synthesis_session::{
    SessionConfig, SessionError, SessionEvent, SessionOutcome, SessionState, SynthesisSession,
};
