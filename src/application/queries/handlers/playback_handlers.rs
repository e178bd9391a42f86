//! Playback Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{
    PlaybackControlPort, PlaybackSettings, PlaybackSnapshot, SettingsStorePort,
};
use crate::application::queries::{GetPlaybackState, GetSettings};

/// GetPlaybackState Handler
pub struct GetPlaybackStateHandler {
    player: Arc<dyn PlaybackControlPort>,
}

impl GetPlaybackStateHandler {
    pub fn new(player: Arc<dyn PlaybackControlPort>) -> Self {
        Self { player }
    }

    pub async fn handle(&self, _query: GetPlaybackState) -> Result<PlaybackSnapshot, ApplicationError> {
        Ok(self.player.snapshot().await?)
    }
}

/// GetSettings Handler
pub struct GetSettingsHandler {
    settings_store: Arc<dyn SettingsStorePort>,
}

impl GetSettingsHandler {
    pub fn new(settings_store: Arc<dyn SettingsStorePort>) -> Self {
        Self { settings_store }
    }

    pub async fn handle(&self, _query: GetSettings) -> Result<PlaybackSettings, ApplicationError> {
        Ok(self.settings_store.load().await?)
    }
}
