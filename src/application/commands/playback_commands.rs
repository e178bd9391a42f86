//! Playback Commands - 播放控制命令

use uuid::Uuid;

use crate::application::ports::Admission;
use crate::domain::UtteranceRequest;

/// 朗读命令 - 按准入规则开始、排队或打断
///
/// voice/speed 缺省时使用当前设置
#[derive(Debug, Clone)]
pub struct SpeakCommand {
    pub text: String,
    pub voice: Option<String>,
    pub speed: Option<f64>,
}

/// 排队命令 - 追加到队尾，空闲时立即开始
#[derive(Debug, Clone)]
pub struct EnqueueCommand {
    pub text: String,
    pub voice: Option<String>,
    pub speed: Option<f64>,
}

/// 朗读/排队响应
#[derive(Debug, Clone)]
pub struct SpeakResponse {
    pub admission: Admission,
    pub request: UtteranceRequest,
}

/// 停止当前朗读并推进队列
#[derive(Debug, Clone)]
pub struct StopCommand;

#[derive(Debug, Clone)]
pub struct StopResponse {
    /// 推进后的当前朗读
    pub next: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct PauseCommand;

#[derive(Debug, Clone)]
pub struct ResumeCommand;

/// 移除排队项命令
#[derive(Debug, Clone)]
pub struct RemoveQueuedCommand {
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct RemoveQueuedResponse {
    pub removed: UtteranceRequest,
}
