//! Speakline - 流式 TTS 朗读服务
//!
//! 启动顺序: 配置 → 日志 → 音频时钟 → TTS 引擎 → 播放器 → HTTP 服务

use std::sync::Arc;
use std::time::Duration;

use speakline::application::ports::{
    AudioDecoderPort, AudioDevicePort, PlaybackSettings, SettingsStorePort, TtsEnginePort,
};
use speakline::config::{load_config, print_config, AppConfig, AudioBackend, TtsBackend};
use speakline::domain::{HybridSplitConfig, Speed, Voice};
use speakline::infrastructure::adapters::{
    FakeTtsClient, FakeTtsClientConfig, FileSettingsStore, HttpTtsClient, HttpTtsClientConfig,
    SymphoniaDecoder,
};
use speakline::infrastructure::audio::{AudioClock, PacedAudioDevice, SegmentScheduler};
use speakline::infrastructure::events::EventPublisher;
use speakline::infrastructure::http::{AppState, HttpServer, ServerConfig};
use speakline::infrastructure::memory::PreloadCache;
use speakline::infrastructure::worker::{PlayerConfig, PlayerWorker, SessionConfig};

fn init_tracing(config: &AppConfig) {
    let log_filter = format!(
        "{},speakline={},tower_http=debug",
        config.log.level, config.log.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_engine(config: &AppConfig) -> anyhow::Result<Arc<dyn TtsEnginePort>> {
    match config.tts.engine {
        TtsBackend::Remote => {
            let tts_config = HttpTtsClientConfig {
                base_url: config.tts.url.clone(),
                timeout_secs: config.tts.timeout_secs,
                max_retries: config.tts.max_retries,
                default_sample_rate: config.audio.default_sample_rate,
                stream_idle_secs: config.tts.stream_idle_secs,
            };
            Ok(Arc::new(HttpTtsClient::new(tts_config)?))
        }
        TtsBackend::Fake => Ok(Arc::new(FakeTtsClient::new(FakeTtsClientConfig {
            sample_rate: config.audio.default_sample_rate,
            chars_per_second: config.playback.chars_per_second,
            ..Default::default()
        }))),
    }
}

fn build_device(config: &AppConfig) -> anyhow::Result<Arc<dyn AudioDevicePort>> {
    match config.audio.backend {
        #[cfg(feature = "cpal-output")]
        AudioBackend::Output => Ok(Arc::new(
            speakline::infrastructure::audio::CpalAudioDevice::open()?,
        )),
        #[cfg(not(feature = "cpal-output"))]
        AudioBackend::Output => anyhow::bail!(
            "audio.backend = \"output\" requires building with the cpal-output feature; \
             set audio.backend = \"headless\" to run without sound"
        ),
        AudioBackend::Headless => {
            tracing::warn!("Headless audio backend, playback is silent");
            Ok(Arc::new(PacedAudioDevice::new(Duration::from_millis(
                config.audio.tick_ms,
            ))))
        }
    }
}

fn player_config(config: &AppConfig, queue_enabled: bool) -> PlayerConfig {
    let playback = &config.playback;
    PlayerConfig {
        session: SessionConfig {
            mode: playback.mode,
            hybrid: HybridSplitConfig {
                target_words: playback.initial_segment_words,
                overlap_words: playback.overlap_words,
                search_window: playback.search_window,
            },
            chars_per_second: playback.chars_per_second,
            ..Default::default()
        },
        poll_interval: Duration::from_millis(playback.poll_interval_ms),
        preload_enabled: playback.preload_enabled,
        queue_enabled,
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Speakline starting");
    print_config(&config);

    // 音频设备不可用时直接退出
    let device = build_device(&config)?;
    let clock = Arc::new(AudioClock::new(device, config.audio.gain)?);
    let scheduler = Arc::new(SegmentScheduler::new(clock));

    let engine = build_engine(&config)?;
    let decoder: Arc<dyn AudioDecoderPort> = Arc::new(SymphoniaDecoder::new());

    if !engine.health_check().await {
        tracing::warn!(url = %config.tts.url, "TTS engine is not reachable yet");
    }

    // 用户设置，文件缺失时使用配置中的默认值
    let defaults = PlaybackSettings {
        voice: Voice::new(config.settings.default_voice.clone())?,
        speed: Speed::new(config.settings.default_speed)?,
        queue_enabled: config.settings.queue_enabled,
    };
    let settings_store = Arc::new(FileSettingsStore::new(&config.settings.path, defaults));
    let settings = settings_store.load().await?;

    let cache = Arc::new(PreloadCache::new(
        engine.clone(),
        decoder.clone(),
        scheduler.clone(),
    ));
    let event_publisher = EventPublisher::new().arc();

    let (worker, player) = PlayerWorker::new(
        player_config(&config, settings.queue_enabled),
        engine,
        decoder,
        scheduler,
        cache,
        event_publisher.clone(),
    );
    tokio::spawn(worker.run());

    let state = AppState::new(Arc::new(player), settings_store, event_publisher);
    let server = HttpServer::new(
        ServerConfig::new(&config.server.host, config.server.port)
            .with_body_limit(config.server.max_body_bytes),
        state,
    );

    server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
            tracing::info!("Received shutdown signal");
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
