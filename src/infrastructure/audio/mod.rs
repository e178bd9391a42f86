//! Audio Layer - 音频输出与排播
//!
//! - AudioClock: 全局时钟 + 增益输出
//! - SegmentScheduler: 片段无缝排播、活动音源追踪
//! - 设备实现: CpalAudioDevice (声卡输出，`cpal-output` feature),
//!   PacedAudioDevice (无声实时推进), ManualAudioDevice (手动推进)

mod clock;
#[cfg(feature = "cpal-output")]
mod cpal_device;
mod manual_device;
mod paced_device;
mod scheduler;
mod timeline;

pub use clock::{AudioClock, DEFAULT_GAIN};
#[cfg(feature = "cpal-output")]
pub use cpal_device::{CpalAudioDevice, OutputFormat};
pub use manual_device::ManualAudioDevice;
pub use paced_device::PacedAudioDevice;
pub use scheduler::{PlaybackLease, ScheduleError, ScheduledSegment, SegmentScheduler};
pub use timeline::{EndedSource, StartedSource, VirtualTimeline};
