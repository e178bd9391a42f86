//! Playback Command Handlers

use std::sync::Arc;

use crate::application::commands::playback_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{PlaybackControlPort, SettingsStorePort};
use crate::domain::{Speed, UtteranceRequest, Voice};

/// 按当前设置补全 voice/speed 并创建朗读请求
async fn build_request(
    settings_store: &dyn SettingsStorePort,
    text: String,
    voice: Option<String>,
    speed: Option<f64>,
) -> Result<UtteranceRequest, ApplicationError> {
    let settings = settings_store.load().await?;
    let voice = match voice {
        Some(v) => Voice::new(v)?,
        None => settings.voice,
    };
    let speed = match speed {
        Some(s) => Speed::new(s)?,
        None => settings.speed,
    };
    Ok(UtteranceRequest::new(text, voice, speed)?)
}

/// Speak Handler - 按准入规则开始、排队或打断
pub struct SpeakHandler {
    player: Arc<dyn PlaybackControlPort>,
    settings_store: Arc<dyn SettingsStorePort>,
}

impl SpeakHandler {
    pub fn new(
        player: Arc<dyn PlaybackControlPort>,
        settings_store: Arc<dyn SettingsStorePort>,
    ) -> Self {
        Self {
            player,
            settings_store,
        }
    }

    pub async fn handle(&self, cmd: SpeakCommand) -> Result<SpeakResponse, ApplicationError> {
        let request =
            build_request(self.settings_store.as_ref(), cmd.text, cmd.voice, cmd.speed).await?;
        let admission = self.player.speak(request.clone()).await?;

        tracing::info!(
            utterance_id = %request.id(),
            chars = request.char_count(),
            voice = %request.voice(),
            speed = request.speed().value(),
            admission = ?admission,
            "Speak request admitted"
        );

        Ok(SpeakResponse { admission, request })
    }
}

/// Enqueue Handler - 追加到队尾
pub struct EnqueueHandler {
    player: Arc<dyn PlaybackControlPort>,
    settings_store: Arc<dyn SettingsStorePort>,
}

impl EnqueueHandler {
    pub fn new(
        player: Arc<dyn PlaybackControlPort>,
        settings_store: Arc<dyn SettingsStorePort>,
    ) -> Self {
        Self {
            player,
            settings_store,
        }
    }

    pub async fn handle(&self, cmd: EnqueueCommand) -> Result<SpeakResponse, ApplicationError> {
        let request =
            build_request(self.settings_store.as_ref(), cmd.text, cmd.voice, cmd.speed).await?;
        let admission = self.player.enqueue(request.clone()).await?;

        tracing::info!(
            utterance_id = %request.id(),
            admission = ?admission,
            "Enqueue request admitted"
        );

        Ok(SpeakResponse { admission, request })
    }
}

/// Stop Handler - 停止当前朗读并推进队列
pub struct StopHandler {
    player: Arc<dyn PlaybackControlPort>,
}

impl StopHandler {
    pub fn new(player: Arc<dyn PlaybackControlPort>) -> Self {
        Self { player }
    }

    pub async fn handle(&self, _cmd: StopCommand) -> Result<StopResponse, ApplicationError> {
        let next = self.player.stop().await?;
        tracing::info!(next = ?next, "Playback stopped");
        Ok(StopResponse { next })
    }
}

/// Pause Handler
pub struct PauseHandler {
    player: Arc<dyn PlaybackControlPort>,
}

impl PauseHandler {
    pub fn new(player: Arc<dyn PlaybackControlPort>) -> Self {
        Self { player }
    }

    pub async fn handle(&self, _cmd: PauseCommand) -> Result<(), ApplicationError> {
        self.player.pause().await?;
        Ok(())
    }
}

/// Resume Handler
pub struct ResumeHandler {
    player: Arc<dyn PlaybackControlPort>,
}

impl ResumeHandler {
    pub fn new(player: Arc<dyn PlaybackControlPort>) -> Self {
        Self { player }
    }

    pub async fn handle(&self, _cmd: ResumeCommand) -> Result<(), ApplicationError> {
        self.player.resume().await?;
        Ok(())
    }
}

/// RemoveQueued Handler - 移除尚未开始的排队项
pub struct RemoveQueuedHandler {
    player: Arc<dyn PlaybackControlPort>,
}

impl RemoveQueuedHandler {
    pub fn new(player: Arc<dyn PlaybackControlPort>) -> Self {
        Self { player }
    }

    pub async fn handle(
        &self,
        cmd: RemoveQueuedCommand,
    ) -> Result<RemoveQueuedResponse, ApplicationError> {
        let removed = self.player.remove_from_queue(cmd.index).await?;
        tracing::info!(index = cmd.index, utterance_id = %removed.id(), "Queued request removed");
        Ok(RemoveQueuedResponse { removed })
    }
}
