//! Settings Command Handlers

use std::sync::Arc;

use crate::application::commands::settings_commands::UpdateSettingsCommand;
use crate::application::error::ApplicationError;
use crate::application::ports::{PlaybackControlPort, PlaybackSettings, SettingsStorePort};
use crate::domain::{Speed, Voice};
use crate::infrastructure::events::EventPublisher;

/// UpdateSettings Handler - 合并、保存并应用设置
pub struct UpdateSettingsHandler {
    settings_store: Arc<dyn SettingsStorePort>,
    player: Arc<dyn PlaybackControlPort>,
    event_publisher: Arc<EventPublisher>,
}

impl UpdateSettingsHandler {
    pub fn new(
        settings_store: Arc<dyn SettingsStorePort>,
        player: Arc<dyn PlaybackControlPort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            settings_store,
            player,
            event_publisher,
        }
    }

    pub async fn handle(
        &self,
        cmd: UpdateSettingsCommand,
    ) -> Result<PlaybackSettings, ApplicationError> {
        let mut settings = self.settings_store.load().await?;

        if let Some(voice) = cmd.voice {
            settings.voice = Voice::new(voice)?;
        }
        if let Some(speed) = cmd.speed {
            settings.speed = Speed::new(speed)?;
        }
        if let Some(enabled) = cmd.queue_enabled {
            settings.queue_enabled = enabled;
        }

        self.settings_store.save(&settings).await?;
        self.player.set_queue_enabled(settings.queue_enabled).await?;
        self.event_publisher.publish_settings_changed(&settings);

        tracing::info!(
            voice = %settings.voice,
            speed = settings.speed.value(),
            queue_enabled = settings.queue_enabled,
            "Settings updated"
        );

        Ok(settings)
    }
}
