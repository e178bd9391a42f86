//! Preload Cache - 预合成下一条朗读
//!
//! 以 (text, voice, speed, engine) 为键保存解码后的片段，
//! 同一键同时最多一个合成在进行。条目只在显式 reset/remove 时清除。

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AudioDecoderPort, DecodeError, StreamRequest, TtsEnginePort, TtsError,
};
use crate::domain::{tokenize_for_streaming, CacheKey, DecodedSegment, Speed, UtteranceRequest};
use crate::infrastructure::audio::{PlaybackLease, ScheduleError, SegmentScheduler};
use crate::infrastructure::worker::spawn_token_feeder;

/// 预加载错误
#[derive(Debug, Error)]
pub enum PreloadError {
    #[error("Synthesis failed: {0}")]
    Engine(#[from] TtsError),

    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Engine returned no audio")]
    NoAudio,
}

/// 条目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadState {
    Pending,
    Ready,
}

#[derive(Debug, Clone)]
struct PreloadedAudio {
    segments: Vec<DecodedSegment>,
    /// 合成时使用的语速
    baked_speed: f64,
}

#[derive(Debug, Clone)]
enum Entry {
    Pending,
    Ready(PreloadedAudio),
}

/// 回放结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreloadedPlayback {
    /// 首个片段开始时间
    pub start_at: f64,
    /// 按回放倍率换算后的总时长
    pub total_secs: f64,
    pub segments: usize,
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadStats {
    pub total_entries: usize,
    pub ready_entries: usize,
    pub pending_entries: usize,
    pub hit_count: u64,
    pub miss_count: u64,
}

pub struct PreloadCache {
    engine: Arc<dyn TtsEnginePort>,
    decoder: Arc<dyn AudioDecoderPort>,
    scheduler: Arc<SegmentScheduler>,
    entries: DashMap<CacheKey, Entry>,
    token_buffer: usize,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl PreloadCache {
    pub fn new(
        engine: Arc<dyn TtsEnginePort>,
        decoder: Arc<dyn AudioDecoderPort>,
        scheduler: Arc<SegmentScheduler>,
    ) -> Self {
        Self {
            engine,
            decoder,
            scheduler,
            entries: DashMap::new(),
            token_buffer: 32,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    /// 请求在当前引擎下的缓存键
    pub fn key_for(&self, request: &UtteranceRequest) -> CacheKey {
        CacheKey::new(request.key(), self.engine.kind())
    }

    pub fn state(&self, request: &UtteranceRequest) -> Option<PreloadState> {
        self.entries.get(&self.key_for(request)).map(|e| match e.value() {
            Entry::Pending => PreloadState::Pending,
            Entry::Ready(_) => PreloadState::Ready,
        })
    }

    pub fn is_ready(&self, request: &UtteranceRequest) -> bool {
        self.state(request) == Some(PreloadState::Ready)
    }

    /// 预合成请求
    ///
    /// 已有 pending/ready 条目时直接返回 `Ok(false)`。失败时释放键以便重试。
    pub async fn preload(&self, request: &UtteranceRequest) -> Result<bool, PreloadError> {
        let key = self.key_for(request);

        match self.entries.entry(key.clone()) {
            MapEntry::Occupied(_) => {
                tracing::trace!(key = %key, "Preload skipped, entry exists");
                return Ok(false);
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::Pending);
            }
        }

        tracing::debug!(key = %key, "Preloading");

        match self.synthesize_all(request).await {
            Ok(segments) => {
                let segment_count = segments.len();
                let audio = PreloadedAudio {
                    segments,
                    baked_speed: request.speed().value(),
                };
                // reset/remove 期间完成的结果直接丢弃
                match self.entries.get_mut(&key) {
                    Some(mut entry) if matches!(entry.value(), Entry::Pending) => {
                        *entry = Entry::Ready(audio);
                        tracing::debug!(key = %key, segments = segment_count, "Preload ready");
                        Ok(true)
                    }
                    _ => {
                        tracing::debug!(key = %key, "Preload result discarded, entry was removed");
                        Ok(false)
                    }
                }
            }
            Err(e) => {
                self.entries
                    .remove_if(&key, |_, entry| matches!(entry, Entry::Pending));
                tracing::warn!(key = %key, error = %e, "Preload failed");
                Err(e)
            }
        }
    }

    /// 通过流式接口合成全部文本并解码
    async fn synthesize_all(
        &self,
        request: &UtteranceRequest,
    ) -> Result<Vec<DecodedSegment>, PreloadError> {
        let (tx, rx) = mpsc::channel(self.token_buffer);
        let _feeder = spawn_token_feeder(
            tokenize_for_streaming(request.text()),
            tx,
            CancellationToken::new(),
        );

        let mut chunks = self
            .engine
            .synthesize_stream(StreamRequest {
                voice: request.voice().clone(),
                speed: request.speed(),
                input: rx,
            })
            .await?;

        let mut segments = Vec::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            segments.push(self.decoder.decode(&chunk.audio).await?);
        }

        if segments.is_empty() {
            return Err(PreloadError::NoAudio);
        }
        Ok(segments)
    }

    /// 回放已就绪的条目
    ///
    /// 从当前时钟时间开始无缝排播全部片段；语速与合成时不同则按
    /// `override / baked` 的倍率播放。条目不存在或未就绪时返回 `Ok(None)`，不排播任何内容。
    pub fn play_preloaded(
        &self,
        request: &UtteranceRequest,
        lease: &PlaybackLease,
        speed_override: Option<Speed>,
    ) -> Result<Option<PreloadedPlayback>, ScheduleError> {
        let key = self.key_for(request);
        let audio = match self.entries.get(&key).map(|e| e.value().clone()) {
            Some(Entry::Ready(audio)) => audio,
            _ => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %key, "Preload cache miss");
                return Ok(None);
            }
        };

        let target_speed = speed_override.map(|s| s.value()).unwrap_or(audio.baked_speed);
        let rate = if (target_speed - audio.baked_speed).abs() > f64::EPSILON {
            target_speed / audio.baked_speed
        } else {
            1.0
        };

        let start_at = self.scheduler.restart_cursor(lease)?;
        let mut total_secs = 0.0;
        for segment in &audio.segments {
            let scheduled = self.scheduler.schedule_segment(lease, segment, rate)?;
            total_secs += scheduled.end_at - scheduled.start_at;
        }

        self.hit_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, rate, total_secs, "Playing preloaded audio");

        Ok(Some(PreloadedPlayback {
            start_at,
            total_secs,
            segments: audio.segments.len(),
        }))
    }

    pub fn remove(&self, request: &UtteranceRequest) -> bool {
        self.entries.remove(&self.key_for(request)).is_some()
    }

    /// 清空全部条目
    pub fn reset(&self) {
        let count = self.entries.len();
        self.entries.clear();
        tracing::debug!(count, "Preload cache reset");
    }

    pub fn stats(&self) -> PreloadStats {
        let mut stats = PreloadStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            ..Default::default()
        };
        for entry in self.entries.iter() {
            stats.total_entries += 1;
            match entry.value() {
                Entry::Pending => stats.pending_entries += 1,
                Entry::Ready(_) => stats.ready_entries += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Voice;
    use crate::infrastructure::adapters::tts::local_tts_server;
    use crate::infrastructure::adapters::{
        FakeTtsClient, FakeTtsClientConfig, HttpTtsClient, HttpTtsClientConfig, SymphoniaDecoder,
    };
    use crate::infrastructure::audio::{AudioClock, ManualAudioDevice, DEFAULT_GAIN};

    struct Fixture {
        device: Arc<ManualAudioDevice>,
        engine: Arc<FakeTtsClient>,
        scheduler: Arc<SegmentScheduler>,
        cache: PreloadCache,
    }

    fn fixture(config: FakeTtsClientConfig) -> Fixture {
        let device = Arc::new(ManualAudioDevice::new());
        let clock = Arc::new(AudioClock::new(device.clone(), DEFAULT_GAIN).unwrap());
        let scheduler = Arc::new(SegmentScheduler::new(clock));
        let engine = Arc::new(FakeTtsClient::new(config));
        let cache = PreloadCache::new(engine.clone(), Arc::new(SymphoniaDecoder::new()), scheduler.clone());
        Fixture {
            device,
            engine,
            scheduler,
            cache,
        }
    }

    fn request(text: &str, speed: f64) -> UtteranceRequest {
        UtteranceRequest::new(text, Voice::default(), Speed::new(speed).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_preload_synthesizes_once() {
        let fx = fixture(FakeTtsClientConfig {
            latency_ms: 20,
            ..Default::default()
        });
        let req = request("Hello, world. This is a test.", 1.0);

        let (a, b) = tokio::join!(fx.cache.preload(&req), fx.cache.preload(&req));
        assert!(a.unwrap() ^ b.unwrap());
        assert_eq!(fx.engine.stream_calls(), 1);
        assert!(fx.cache.is_ready(&req));

        // 就绪后再次预加载也是空操作
        assert!(!fx.cache.preload(&req).await.unwrap());
        assert_eq!(fx.engine.stream_calls(), 1);
    }

    #[tokio::test]
    async fn test_preload_from_server_that_reads_full_body() {
        let (base_url, server) = local_tts_server::spawn().await;
        let fx = fixture(FakeTtsClientConfig::default());
        let engine = HttpTtsClient::new(HttpTtsClientConfig::new(base_url).with_timeout(5)).unwrap();
        let cache = PreloadCache::new(
            Arc::new(engine),
            Arc::new(SymphoniaDecoder::new()),
            fx.scheduler.clone(),
        );
        let req = request("Preloaded over the network.", 1.0);

        let stored = tokio::time::timeout(std::time::Duration::from_secs(5), cache.preload(&req))
            .await
            .expect("preload must not wait on its own input")
            .unwrap();
        assert!(stored);
        assert!(cache.is_ready(&req));
        server.abort();
    }

    #[tokio::test]
    async fn test_play_missing_key_is_noop() {
        let fx = fixture(FakeTtsClientConfig::default());
        let lease = fx.scheduler.begin();

        let played = fx.cache.play_preloaded(&request("Nothing here.", 1.0), &lease, None).unwrap();
        assert!(played.is_none());
        assert!(fx.scheduler.is_drained());
        assert!(fx.device.started_sources().is_empty());
        assert_eq!(fx.cache.stats().miss_count, 1);
    }

    #[tokio::test]
    async fn test_play_preloaded_back_to_back() {
        let fx = fixture(FakeTtsClientConfig::default());
        let req = request("First part. Second part.", 1.0);
        fx.cache.preload(&req).await.unwrap();

        fx.device.advance(2.0);
        let lease = fx.scheduler.begin();
        let played = fx.cache.play_preloaded(&req, &lease, None).unwrap().unwrap();

        assert_eq!(played.segments, 2);
        assert_eq!(played.start_at, 2.0);
        let expected = fx.engine.expected_duration("First part.", 1.0)
            + fx.engine.expected_duration("Second part.", 1.0);
        assert!((played.total_secs - expected).abs() < 1e-6);

        let started = fx.device.started_sources();
        assert!((started[1].start_at - started[0].end_at()).abs() < 1e-9);
        assert_eq!(fx.cache.stats().hit_count, 1);
    }

    #[tokio::test]
    async fn test_speed_override_changes_rate() {
        let fx = fixture(FakeTtsClientConfig::default());
        let req = request("Just one sentence here.", 1.0);
        fx.cache.preload(&req).await.unwrap();

        let lease = fx.scheduler.begin();
        let played = fx
            .cache
            .play_preloaded(&req, &lease, Some(Speed::new(2.0).unwrap()))
            .unwrap()
            .unwrap();

        let baked = fx.engine.expected_duration("Just one sentence here.", 1.0);
        assert!((played.total_secs - baked / 2.0).abs() < 1e-6);
        assert_eq!(fx.device.started_sources()[0].playback_rate, 2.0);
    }

    #[tokio::test]
    async fn test_failed_preload_releases_key() {
        let fx = fixture(FakeTtsClientConfig::default());
        let req = request("Will fail first.", 1.0);

        fx.engine.set_failing(true);
        assert!(fx.cache.preload(&req).await.is_err());
        assert_eq!(fx.cache.state(&req), None);

        fx.engine.set_failing(false);
        assert!(fx.cache.preload(&req).await.unwrap());
        assert!(fx.cache.is_ready(&req));
    }

    #[tokio::test]
    async fn test_reset_and_remove() {
        let fx = fixture(FakeTtsClientConfig::default());
        let a = request("Alpha.", 1.0);
        let b = request("Beta.", 1.0);
        fx.cache.preload(&a).await.unwrap();
        fx.cache.preload(&b).await.unwrap();
        assert_eq!(fx.cache.stats().ready_entries, 2);

        assert!(fx.cache.remove(&a));
        assert!(!fx.cache.remove(&a));
        assert_eq!(fx.cache.stats().total_entries, 1);

        fx.cache.reset();
        assert_eq!(fx.cache.stats().total_entries, 0);
    }

    #[tokio::test]
    async fn test_speed_is_part_of_key() {
        let fx = fixture(FakeTtsClientConfig::default());
        fx.cache.preload(&request("Same text.", 1.0)).await.unwrap();
        assert!(!fx.cache.is_ready(&request("Same text.", 1.5)));
    }
}
