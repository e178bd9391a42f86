//! Playback Queries - 播放状态与设置查询

/// 获取播放器快照
#[derive(Debug, Clone)]
pub struct GetPlaybackState;

/// 获取当前设置
#[derive(Debug, Clone)]
pub struct GetSettings;
