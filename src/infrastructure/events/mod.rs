//! Event Layer - 播放器事件推送

mod publisher;

pub use publisher::{EventPublisher, FinishOutcome, PlayerEvent};
