//! Settings Commands - 播放设置命令

/// 更新设置命令，未提供的字段保持不变
#[derive(Debug, Clone, Default)]
pub struct UpdateSettingsCommand {
    pub voice: Option<String>,
    pub speed: Option<f64>,
    pub queue_enabled: Option<bool>,
}
