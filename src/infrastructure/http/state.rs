//! Application State
//!
//! 包含所有 Command/Query Handlers 的应用状态

use std::sync::Arc;

use crate::application::{
    // Command handlers
    EnqueueHandler, PauseHandler, RemoveQueuedHandler, ResumeHandler, SpeakHandler, StopHandler,
    UpdateSettingsHandler,
    // Query handlers
    GetPlaybackStateHandler, GetSettingsHandler,
    // Ports
    PlaybackControlPort, SettingsStorePort,
};
use crate::infrastructure::events::EventPublisher;

/// 应用状态
pub struct AppState {
    // ========== Ports ==========
    pub player: Arc<dyn PlaybackControlPort>,
    pub settings_store: Arc<dyn SettingsStorePort>,
    pub event_publisher: Arc<EventPublisher>,

    // ========== Command Handlers ==========
    pub speak_handler: SpeakHandler,
    pub enqueue_handler: EnqueueHandler,
    pub stop_handler: StopHandler,
    pub pause_handler: PauseHandler,
    pub resume_handler: ResumeHandler,
    pub remove_queued_handler: RemoveQueuedHandler,
    pub update_settings_handler: UpdateSettingsHandler,

    // ========== Query Handlers ==========
    pub get_playback_state_handler: GetPlaybackStateHandler,
    pub get_settings_handler: GetSettingsHandler,
}

impl AppState {
    /// 创建应用状态
    pub fn new(
        player: Arc<dyn PlaybackControlPort>,
        settings_store: Arc<dyn SettingsStorePort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            // Command handlers
            speak_handler: SpeakHandler::new(player.clone(), settings_store.clone()),
            enqueue_handler: EnqueueHandler::new(player.clone(), settings_store.clone()),
            stop_handler: StopHandler::new(player.clone()),
            pause_handler: PauseHandler::new(player.clone()),
            resume_handler: ResumeHandler::new(player.clone()),
            remove_queued_handler: RemoveQueuedHandler::new(player.clone()),
            update_settings_handler: UpdateSettingsHandler::new(
                settings_store.clone(),
                player.clone(),
                event_publisher.clone(),
            ),

            // Query handlers
            get_playback_state_handler: GetPlaybackStateHandler::new(player.clone()),
            get_settings_handler: GetSettingsHandler::new(settings_store.clone()),

            // Ports
            player,
            settings_store,
            event_publisher,
        }
    }
}

/// 以 ManualAudioDevice 与 FakeTtsClient 组装的状态，设置文件写在 `dir` 下
#[cfg(test)]
pub(crate) fn test_state(dir: &std::path::Path) -> AppState {
    use crate::application::ports::{AudioDecoderPort, PlaybackSettings};
    use crate::infrastructure::adapters::{
        FakeTtsClient, FakeTtsClientConfig, FileSettingsStore, SymphoniaDecoder,
    };
    use crate::infrastructure::audio::{AudioClock, ManualAudioDevice, SegmentScheduler, DEFAULT_GAIN};
    use crate::infrastructure::memory::PreloadCache;
    use crate::infrastructure::worker::{PlayerConfig, PlayerWorker};

    let device = Arc::new(ManualAudioDevice::new());
    let clock = Arc::new(AudioClock::new(device, DEFAULT_GAIN).unwrap());
    let scheduler = Arc::new(SegmentScheduler::new(clock));
    let engine = Arc::new(FakeTtsClient::new(FakeTtsClientConfig::default()));
    let decoder: Arc<dyn AudioDecoderPort> = Arc::new(SymphoniaDecoder::new());
    let cache = Arc::new(PreloadCache::new(engine.clone(), decoder.clone(), scheduler.clone()));
    let publisher = EventPublisher::new().arc();

    let (worker, handle) = PlayerWorker::new(
        PlayerConfig::default(),
        engine,
        decoder,
        scheduler,
        cache,
        publisher.clone(),
    );
    tokio::spawn(worker.run());

    let settings_store = Arc::new(FileSettingsStore::new(
        dir.join("settings.json"),
        PlaybackSettings::default(),
    ));
    AppState::new(Arc::new(handle), settings_store, publisher)
}
