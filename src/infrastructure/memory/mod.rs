//! Memory Layer - In-Memory State Management
//!
//! 预加载缓存与请求队列

mod preload_cache;
mod request_queue;

pub use preload_cache::{PreloadCache, PreloadError, PreloadState, PreloadStats, PreloadedPlayback};
pub use request_queue::{AdmitDecision, Advance, QueueError, QueuePhase, RequestQueue};
