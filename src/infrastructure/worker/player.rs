//! Player - 播放编排 actor
//!
//! 单一所有者：队列与当前朗读只在 actor 任务内修改。
//! 控制面通过 `PlayerHandle` 发送命令，结果经 oneshot 返回。

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::synthesis_session::{
    SessionConfig, SessionError, SessionEvent, SessionOutcome, SynthesisSession,
};
use crate::application::ports::{
    Admission, AudioDecoderPort, PlaybackControlPort, PlaybackError, PlaybackSnapshot,
    PlaybackState, QueuedItem, TtsEnginePort,
};
use crate::domain::{estimate_duration, word_count, ProgressSnapshot, ProgressTracker, UtteranceRequest};
use crate::infrastructure::audio::{PlaybackLease, SegmentScheduler};
use crate::infrastructure::events::{EventPublisher, FinishOutcome, PlayerEvent};
use crate::infrastructure::memory::{AdmitDecision, Advance, PreloadCache, QueueError, RequestQueue};

/// 播放器配置
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub session: SessionConfig,
    /// 进度推送间隔
    pub poll_interval: Duration,
    pub preload_enabled: bool,
    /// 启动时是否启用排队
    pub queue_enabled: bool,
    pub command_buffer: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            poll_interval: Duration::from_millis(100),
            preload_enabled: true,
            queue_enabled: false,
            command_buffer: 64,
        }
    }
}

enum PlayerCommand {
    Speak {
        request: UtteranceRequest,
        reply: oneshot::Sender<Admission>,
    },
    Enqueue {
        request: UtteranceRequest,
        reply: oneshot::Sender<Admission>,
    },
    Stop {
        reply: oneshot::Sender<Option<Uuid>>,
    },
    Pause {
        reply: oneshot::Sender<Result<(), PlaybackError>>,
    },
    Resume {
        reply: oneshot::Sender<Result<(), PlaybackError>>,
    },
    RemoveFromQueue {
        index: usize,
        reply: oneshot::Sender<Result<UtteranceRequest, PlaybackError>>,
    },
    SetQueueEnabled {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<PlaybackSnapshot>,
    },
}

/// 后台任务回报
enum Internal {
    Session {
        utterance_id: Uuid,
        event: SessionEvent,
    },
    SessionFinished {
        utterance_id: Uuid,
        result: Result<SessionOutcome, SessionError>,
    },
    PreloadFinished {
        utterance_id: Uuid,
        ready: bool,
    },
}

/// 当前朗读
struct CurrentRun {
    request: UtteranceRequest,
    cancel: CancellationToken,
    tracker: ProgressTracker,
    /// 合成已全部结束（或来自预加载）
    synthesis_done: bool,
}

/// 播放器 Worker
pub struct PlayerWorker {
    config: PlayerConfig,
    commands: mpsc::Receiver<PlayerCommand>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    engine: Arc<dyn TtsEnginePort>,
    decoder: Arc<dyn AudioDecoderPort>,
    scheduler: Arc<SegmentScheduler>,
    cache: Arc<PreloadCache>,
    publisher: Arc<EventPublisher>,
    queue: RequestQueue,
    current: Option<CurrentRun>,
    state: PlaybackState,
    preloading: Option<Uuid>,
}

impl PlayerWorker {
    pub fn new(
        config: PlayerConfig,
        engine: Arc<dyn TtsEnginePort>,
        decoder: Arc<dyn AudioDecoderPort>,
        scheduler: Arc<SegmentScheduler>,
        cache: Arc<PreloadCache>,
        publisher: Arc<EventPublisher>,
    ) -> (Self, PlayerHandle) {
        let (command_tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let handle = PlayerHandle {
            commands: command_tx,
            publisher: publisher.clone(),
        };

        let worker = Self {
            queue: RequestQueue::new(config.queue_enabled),
            config,
            commands,
            internal_tx,
            internal_rx,
            engine,
            decoder,
            scheduler,
            cache,
            publisher,
            current: None,
            state: PlaybackState::Idle,
            preloading: None,
        };
        (worker, handle)
    }

    /// 启动 Worker，所有 handle 被丢弃后退出
    pub async fn run(mut self) {
        tracing::info!(
            mode = self.config.session.mode.as_str(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            preload_enabled = self.config.preload_enabled,
            queue_enabled = self.queue.queue_enabled(),
            "Player started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut active = self.scheduler.subscribe_active();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(message) = self.internal_rx.recv() => self.handle_internal(message).await,
                Ok(()) = active.changed() => self.check_completion().await,
                _ = ticker.tick() => self.on_tick().await,
            }
        }

        if let Some(run) = self.current.take() {
            run.cancel.cancel();
        }
        self.scheduler.stop_all();
        tracing::info!("Player stopped");
    }

    async fn handle_command(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::Speak { request, reply } => {
                let admission = self.speak(request).await;
                let _ = reply.send(admission);
            }
            PlayerCommand::Enqueue { request, reply } => {
                let utterance_id = request.id();
                let decision = self.queue.enqueue(request);
                let admission = self.apply_decision(utterance_id, decision).await;
                let _ = reply.send(admission);
            }
            PlayerCommand::Stop { reply } => {
                let next = self.stop_and_advance().await;
                let _ = reply.send(next);
            }
            PlayerCommand::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            PlayerCommand::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            PlayerCommand::RemoveFromQueue { index, reply } => {
                let result = self.remove_from_queue(index);
                let _ = reply.send(result);
            }
            PlayerCommand::SetQueueEnabled { enabled, reply } => {
                self.queue.set_queue_enabled(enabled);
                tracing::debug!(enabled, "Queueing toggled");
                let _ = reply.send(());
            }
            PlayerCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn speak(&mut self, request: UtteranceRequest) -> Admission {
        let utterance_id = request.id();
        let decision = self.queue.admit(request);
        self.apply_decision(utterance_id, decision).await
    }

    async fn apply_decision(&mut self, utterance_id: Uuid, decision: AdmitDecision) -> Admission {
        match decision {
            AdmitDecision::Start(request) => {
                self.start(request).await;
                Admission::Started { utterance_id }
            }
            AdmitDecision::Enqueued { position } => {
                self.publish_queue();
                self.maybe_preload();
                Admission::Enqueued {
                    utterance_id,
                    position,
                }
            }
            AdmitDecision::Interrupt { stopped } => {
                self.teardown_current(FinishOutcome::Stopped);
                self.publish_queue();
                if let Some(next) = self.queue.finish_stop() {
                    self.start(next).await;
                }
                Admission::Interrupted {
                    utterance_id,
                    stopped,
                }
            }
        }
    }

    /// 开始当前朗读：预加载命中时直接回放，否则启动合成会话
    async fn start(&mut self, request: UtteranceRequest) {
        // 暂停中停止后时钟仍处于挂起状态
        if self.scheduler.clock().is_suspended() {
            if let Err(e) = self.scheduler.clock().resume().await {
                tracing::error!(error = %e, "Failed to resume audio clock");
            }
            self.set_state(PlaybackState::Loading);
        }

        let lease = self.scheduler.begin();
        let utterance_id = request.id();

        match self.cache.play_preloaded(&request, &lease, None) {
            Ok(Some(playback)) => {
                let mut tracker =
                    ProgressTracker::with_estimate(utterance_id, playback.total_secs, 1.0);
                tracker.refine(playback.total_secs, false);
                tracker.mark_started(playback.start_at);

                self.queue.mark_started(utterance_id);
                self.publisher.publish_utterance_started(&request, true);
                self.current = Some(CurrentRun {
                    request,
                    cancel: CancellationToken::new(),
                    tracker,
                    synthesis_done: true,
                });
                self.set_state(PlaybackState::Playing);
                tracing::info!(utterance_id = %utterance_id, "Playing preloaded utterance");
            }
            Ok(None) => self.spawn_session(request, lease),
            Err(e) => {
                tracing::warn!(utterance_id = %utterance_id, error = %e, "Preloaded playback failed, synthesizing");
                self.scheduler.stop_all();
                let lease = self.scheduler.begin();
                self.spawn_session(request, lease);
            }
        }

        self.publish_queue();
        self.maybe_preload();
    }

    fn spawn_session(&mut self, request: UtteranceRequest, lease: PlaybackLease) {
        let utterance_id = request.id();
        let tracker = ProgressTracker::with_estimate(
            utterance_id,
            estimate_duration(request.text(), self.config.session.chars_per_second),
            request.speed().value(),
        );

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let session = SynthesisSession::new(
            request.clone(),
            self.config.session.clone(),
            self.engine.clone(),
            self.decoder.clone(),
            self.scheduler.clone(),
            lease,
            event_tx,
        );
        let cancel = session.cancel_token();

        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let run = async move {
                let mut session = session;
                session.run().await
            };
            // 会话结束后事件通道关闭，转发完全部事件后再报告结束
            let forward = async {
                while let Some(event) = event_rx.recv().await {
                    let _ = internal.send(Internal::Session {
                        utterance_id,
                        event,
                    });
                }
            };
            let (result, ()) = tokio::join!(run, forward);
            let _ = internal.send(Internal::SessionFinished {
                utterance_id,
                result,
            });
        });

        self.publisher.publish_utterance_started(&request, false);
        self.current = Some(CurrentRun {
            request,
            cancel,
            tracker,
            synthesis_done: false,
        });
        self.set_state(PlaybackState::Loading);
    }

    /// 取消当前会话并停止全部音源
    fn teardown_current(&mut self, outcome: FinishOutcome) -> Option<Uuid> {
        let run = self.current.take()?;
        run.cancel.cancel();
        let stopped = self.scheduler.stop_all();
        let utterance_id = run.request.id();

        tracing::info!(
            utterance_id = %utterance_id,
            outcome = outcome.as_str(),
            stopped_sources = stopped,
            "Utterance torn down"
        );
        self.publisher.publish_utterance_finished(utterance_id, outcome);
        Some(utterance_id)
    }

    /// 推进到队首，返回新的当前朗读
    async fn advance(&mut self, finished: Uuid) -> Option<Uuid> {
        match self.queue.advance(finished) {
            Advance::Next(next) => {
                let next_id = next.id();
                self.start(next).await;
                Some(next_id)
            }
            Advance::Idle => {
                self.set_state(PlaybackState::Idle);
                self.publish_queue();
                None
            }
            Advance::Stale => self.queue.current().map(|r| r.id()),
        }
    }

    async fn stop_and_advance(&mut self) -> Option<Uuid> {
        let current_id = self.queue.current().map(|r| r.id())?;
        self.teardown_current(FinishOutcome::Stopped);
        self.advance(current_id).await
    }

    async fn pause(&mut self) -> Result<(), PlaybackError> {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Loading) {
            return Ok(());
        }
        self.scheduler
            .clock()
            .suspend()
            .await
            .map_err(|e| PlaybackError::Device(e.to_string()))?;
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), PlaybackError> {
        if self.state != PlaybackState::Paused {
            return Ok(());
        }
        self.scheduler
            .clock()
            .resume()
            .await
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        let started = self
            .current
            .as_ref()
            .map(|run| run.tracker.started_at().is_some());
        let state = match started {
            Some(true) => PlaybackState::Playing,
            Some(false) => PlaybackState::Loading,
            None => PlaybackState::Idle,
        };
        self.set_state(state);
        // 挂起期间可能已播放完毕
        self.check_completion().await;
        Ok(())
    }

    fn remove_from_queue(&mut self, index: usize) -> Result<UtteranceRequest, PlaybackError> {
        let removed = self.queue.remove_at(index).map_err(|e| match e {
            QueueError::IndexOutOfRange { index, len } => {
                PlaybackError::QueueIndexOutOfRange { index, len }
            }
        })?;
        self.cache.remove(&removed);
        tracing::debug!(utterance_id = %removed.id(), index, "Removed from queue");
        self.publish_queue();
        self.maybe_preload();
        Ok(removed)
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Session {
                utterance_id,
                event,
            } => self.on_session_event(utterance_id, event),
            Internal::SessionFinished {
                utterance_id,
                result,
            } => self.on_session_finished(utterance_id, result).await,
            Internal::PreloadFinished {
                utterance_id,
                ready,
            } => {
                if self.preloading == Some(utterance_id) {
                    self.preloading = None;
                }
                if ready {
                    self.publisher.publish_preload_ready(utterance_id);
                    self.publish_queue();
                }
                self.maybe_preload();
            }
        }
    }

    fn on_session_event(&mut self, utterance_id: Uuid, event: SessionEvent) {
        let Some(run) = self.current.as_mut().filter(|r| r.request.id() == utterance_id) else {
            return;
        };

        match event {
            SessionEvent::FirstChunkReady {
                duration_secs,
                start_at,
            } => {
                run.tracker.mark_started(start_at);
                self.queue.mark_started(utterance_id);
                tracing::debug!(utterance_id = %utterance_id, duration_secs, start_at, "First chunk ready");
                if self.state == PlaybackState::Loading {
                    self.set_state(PlaybackState::Playing);
                }
            }
            SessionEvent::ChunkScheduled { total_secs, .. } => {
                run.tracker.refine(total_secs, true);
            }
            SessionEvent::EstimateRefined {
                total_secs,
                provisional,
            } => {
                run.tracker.refine(total_secs, provisional);
            }
            SessionEvent::Complete { total_secs } => {
                run.tracker.refine(total_secs, false);
            }
        }
    }

    async fn on_session_finished(
        &mut self,
        utterance_id: Uuid,
        result: Result<SessionOutcome, SessionError>,
    ) {
        let is_current = self
            .current
            .as_ref()
            .map(|r| r.request.id() == utterance_id)
            .unwrap_or(false);
        if !is_current {
            tracing::trace!(utterance_id = %utterance_id, "Ignoring finished stale session");
            return;
        }

        match result {
            Ok(SessionOutcome::Completed { total_secs }) => {
                if let Some(run) = self.current.as_mut() {
                    run.synthesis_done = true;
                    run.tracker.refine(total_secs, false);
                }
                self.maybe_preload();
                self.check_completion().await;
            }
            Ok(SessionOutcome::Cancelled) => {}
            Err(e) => {
                tracing::error!(utterance_id = %utterance_id, error = %e, "Utterance failed");
                self.publisher.publish_session_failed(utterance_id, &e.to_string());
                self.teardown_current(FinishOutcome::Failed);
                self.advance(utterance_id).await;
            }
        }
    }

    /// 合成已结束且活动音源为空时，当前朗读播放完毕
    async fn check_completion(&mut self) {
        let done = match &self.current {
            Some(run) => {
                run.synthesis_done
                    && self.state != PlaybackState::Paused
                    && self.scheduler.is_drained()
            }
            None => false,
        };
        if !done {
            return;
        }

        let Some(mut run) = self.current.take() else {
            return;
        };
        let utterance_id = run.request.id();
        run.tracker.finish();
        self.publisher
            .publish_progress(run.tracker.snapshot(self.scheduler.clock().now()));
        self.publisher
            .publish_utterance_finished(utterance_id, FinishOutcome::Completed);
        tracing::info!(utterance_id = %utterance_id, "Utterance completed");

        self.advance(utterance_id).await;
    }

    async fn on_tick(&mut self) {
        if self.state == PlaybackState::Playing {
            if let Some(run) = &self.current {
                let snapshot = run.tracker.snapshot(self.scheduler.clock().now());
                self.publisher.publish_progress(snapshot);
            }
        }
        self.check_completion().await;
    }

    /// 预加载队首，同时最多一个；当前朗读仍在合成时等待
    fn maybe_preload(&mut self) {
        if !self.config.preload_enabled || self.preloading.is_some() {
            return;
        }
        if self.current.as_ref().map(|r| !r.synthesis_done).unwrap_or(false) {
            return;
        }
        let Some(head) = self.queue.head().cloned() else {
            return;
        };
        if self.cache.state(&head).is_some() {
            return;
        }

        let utterance_id = head.id();
        self.preloading = Some(utterance_id);
        let cache = self.cache.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let ready = match cache.preload(&head).await {
                Ok(_) => cache.is_ready(&head),
                Err(_) => false,
            };
            let _ = internal.send(Internal::PreloadFinished {
                utterance_id,
                ready,
            });
        });
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            tracing::debug!(from = self.state.as_str(), to = state.as_str(), "Playback state changed");
            self.state = state;
            self.publisher.publish_state_changed(state);
        }
    }

    fn queue_items(&self) -> Vec<QueuedItem> {
        self.queue
            .items()
            .map(|r| QueuedItem {
                utterance_id: r.id(),
                text: r.text().to_string(),
                voice: r.voice().to_string(),
                speed: r.speed().value(),
                word_count: word_count(r.text()),
                preloaded: self.cache.is_ready(r),
            })
            .collect()
    }

    fn publish_queue(&self) {
        self.publisher.publish_queue_changed(self.queue_items());
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        let now = self.scheduler.clock().now();
        PlaybackSnapshot {
            state: self.state,
            current: self.current.as_ref().map(|r| r.request.clone()),
            progress: self.current.as_ref().map(|r| r.tracker.snapshot(now)),
            queue: self.queue_items(),
            queue_enabled: self.queue.queue_enabled(),
        }
    }
}

/// 播放器控制句柄
#[derive(Clone)]
pub struct PlayerHandle {
    commands: mpsc::Sender<PlayerCommand>,
    publisher: Arc<EventPublisher>,
}

impl PlayerHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> PlayerCommand,
    ) -> Result<T, PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| PlaybackError::PlayerStopped)?;
        rx.await.map_err(|_| PlaybackError::PlayerStopped)
    }

    /// 订阅进度快照，回调在后台任务中执行
    pub fn subscribe_progress<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(ProgressSnapshot) + Send + 'static,
    {
        let mut rx = self.publisher.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(PlayerEvent::Progress(snapshot)) => callback(snapshot),
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Progress subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[async_trait]
impl PlaybackControlPort for PlayerHandle {
    async fn speak(&self, request: UtteranceRequest) -> Result<Admission, PlaybackError> {
        self.call(|reply| PlayerCommand::Speak { request, reply }).await
    }

    async fn enqueue(&self, request: UtteranceRequest) -> Result<Admission, PlaybackError> {
        self.call(|reply| PlayerCommand::Enqueue { request, reply }).await
    }

    async fn stop(&self) -> Result<Option<Uuid>, PlaybackError> {
        self.call(|reply| PlayerCommand::Stop { reply }).await
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        self.call(|reply| PlayerCommand::Pause { reply }).await?
    }

    async fn resume(&self) -> Result<(), PlaybackError> {
        self.call(|reply| PlayerCommand::Resume { reply }).await?
    }

    async fn remove_from_queue(&self, index: usize) -> Result<UtteranceRequest, PlaybackError> {
        self.call(|reply| PlayerCommand::RemoveFromQueue { index, reply })
            .await?
    }

    async fn set_queue_enabled(&self, enabled: bool) -> Result<(), PlaybackError> {
        self.call(|reply| PlayerCommand::SetQueueEnabled { enabled, reply })
            .await
    }

    async fn snapshot(&self) -> Result<PlaybackSnapshot, PlaybackError> {
        self.call(|reply| PlayerCommand::Snapshot { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Speed, Voice};
    use crate::infrastructure::adapters::{FakeTtsClient, FakeTtsClientConfig, SymphoniaDecoder};
    use crate::infrastructure::audio::{AudioClock, ManualAudioDevice, DEFAULT_GAIN};
    use tokio::sync::broadcast;

    struct Fixture {
        device: Arc<ManualAudioDevice>,
        engine: Arc<FakeTtsClient>,
        scheduler: Arc<SegmentScheduler>,
        handle: PlayerHandle,
        events: broadcast::Receiver<PlayerEvent>,
    }

    fn fixture(engine_config: FakeTtsClientConfig, queue_enabled: bool, preload_enabled: bool) -> Fixture {
        let device = Arc::new(ManualAudioDevice::new());
        let clock = Arc::new(AudioClock::new(device.clone(), DEFAULT_GAIN).unwrap());
        let scheduler = Arc::new(SegmentScheduler::new(clock));
        let engine = Arc::new(FakeTtsClient::new(engine_config));
        let decoder: Arc<dyn AudioDecoderPort> = Arc::new(SymphoniaDecoder::new());
        let cache = Arc::new(PreloadCache::new(engine.clone(), decoder.clone(), scheduler.clone()));
        let publisher = EventPublisher::with_capacity(1024).arc();
        let events = publisher.subscribe();

        let config = PlayerConfig {
            poll_interval: Duration::from_millis(10),
            queue_enabled,
            preload_enabled,
            ..Default::default()
        };
        let (worker, handle) = PlayerWorker::new(
            config,
            engine.clone(),
            decoder,
            scheduler.clone(),
            cache,
            publisher,
        );
        tokio::spawn(worker.run());

        Fixture {
            device,
            engine,
            scheduler,
            handle,
            events,
        }
    }

    fn request(text: &str) -> UtteranceRequest {
        UtteranceRequest::new(text, Voice::default(), Speed::NORMAL).unwrap()
    }

    /// 推进虚拟时钟直到满足条件，返回期间收到的全部事件
    async fn drive_until(
        fx: &mut Fixture,
        mut done: impl FnMut(&PlayerEvent) -> bool,
    ) -> Vec<PlayerEvent> {
        let mut seen = Vec::new();
        let result = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                while let Ok(event) = fx.events.try_recv() {
                    let finished = done(&event);
                    seen.push(event);
                    if finished {
                        return;
                    }
                }
                fx.device.advance(0.05);
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await;
        assert!(result.is_ok(), "timed out, events: {:?}", seen);
        seen
    }

    fn finished(event: &PlayerEvent, id: Uuid, expected: FinishOutcome) -> bool {
        matches!(event, PlayerEvent::UtteranceFinished { utterance_id, outcome }
            if *utterance_id == id && *outcome == expected)
    }

    #[tokio::test]
    async fn test_single_utterance_reaches_full_progress() {
        let mut fx = fixture(FakeTtsClientConfig::default(), false, false);
        let req = request("Hello, world. This is a test.");
        let id = req.id();

        let admission = fx.handle.speak(req).await.unwrap();
        assert_eq!(admission, Admission::Started { utterance_id: id });

        let events = drive_until(&mut fx, |e| finished(e, id, FinishOutcome::Completed)).await;

        let last_progress = events
            .iter()
            .rev()
            .find_map(|e| match e {
                PlayerEvent::Progress(p) if p.utterance_id == id => Some(*p),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_progress.percent, 100.0);
        assert!(!last_progress.is_provisional);

        let expected = fx.engine.expected_duration("Hello, world.", 1.0)
            + fx.engine.expected_duration("This is a test.", 1.0);
        assert!((last_progress.total_secs - expected).abs() < 1e-6);

        assert!(fx.scheduler.is_drained());
        assert_eq!(fx.device.started_sources().len(), 2);

        let snapshot = fx.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(snapshot.current.is_none());
    }

    #[tokio::test]
    async fn test_progress_provisional_until_synthesis_ends() {
        let mut fx = fixture(
            FakeTtsClientConfig {
                latency_ms: 60,
                ..Default::default()
            },
            false,
            false,
        );
        let req = request("First sentence here. Then a second one. And a third to finish.");
        let id = req.id();
        fx.handle.speak(req).await.unwrap();

        let events = drive_until(&mut fx, |e| finished(e, id, FinishOutcome::Completed)).await;
        let progress: Vec<ProgressSnapshot> = events
            .iter()
            .filter_map(|e| match e {
                PlayerEvent::Progress(p) if p.utterance_id == id => Some(*p),
                _ => None,
            })
            .collect();

        // 后两句合成期间至少推送过一次进度
        let provisional = progress.iter().take_while(|p| p.is_provisional).count();
        assert!(provisional > 0, "progress: {:?}", progress);

        // 一旦定稿不再回到暂定
        assert!(progress[provisional..].iter().all(|p| !p.is_provisional));
        let last = progress.last().unwrap();
        assert_eq!(last.percent, 100.0);
        assert!(!last.is_provisional);
        assert_eq!(fx.engine.stream_calls(), 1);
    }

    #[tokio::test]
    async fn test_speak_interrupts_when_queueing_disabled() {
        let mut fx = fixture(FakeTtsClientConfig::default(), false, false);
        let a = request("This sentence is long enough to still be playing. And another one.");
        let b = request("Short one.");
        let (a_id, b_id) = (a.id(), b.id());

        fx.handle.speak(a).await.unwrap();
        drive_until(&mut fx, |e| {
            matches!(e, PlayerEvent::StateChanged { state: PlaybackState::Playing })
        })
        .await;

        let admission = fx.handle.speak(b).await.unwrap();
        assert_eq!(
            admission,
            Admission::Interrupted {
                utterance_id: b_id,
                stopped: Some(a_id)
            }
        );

        let snapshot = fx.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.current.map(|r| r.id()), Some(b_id));
        assert!(snapshot.queue.is_empty());

        let events = drive_until(&mut fx, |e| finished(e, b_id, FinishOutcome::Completed)).await;
        assert!(!events.iter().any(|e| finished(e, a_id, FinishOutcome::Completed)));
    }

    #[tokio::test]
    async fn test_stop_advances_through_queue() {
        let fx = fixture(FakeTtsClientConfig::default(), true, false);
        let (a, b, c) = (request("Alpha."), request("Bravo."), request("Charlie."));
        let (b_id, c_id) = (b.id(), c.id());

        fx.handle.speak(a).await.unwrap();
        assert_eq!(
            fx.handle.speak(b).await.unwrap(),
            Admission::Enqueued {
                utterance_id: b_id,
                position: 0
            }
        );
        fx.handle.speak(c).await.unwrap();

        assert_eq!(fx.handle.stop().await.unwrap(), Some(b_id));
        assert_eq!(fx.handle.stop().await.unwrap(), Some(c_id));
        assert_eq!(fx.handle.stop().await.unwrap(), None);

        let snapshot = fx.handle.snapshot().await.unwrap();
        assert!(snapshot.current.is_none());
        assert!(snapshot.queue.is_empty());
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(fx.scheduler.is_drained());
    }

    #[tokio::test]
    async fn test_failed_utterance_still_advances() {
        let mut fx = fixture(
            FakeTtsClientConfig {
                fail_stream_after: Some(0),
                ..Default::default()
            },
            true,
            false,
        );
        let (a, b) = (request("Will fail."), request("Also fails."));
        let (a_id, b_id) = (a.id(), b.id());

        fx.handle.speak(a).await.unwrap();
        fx.handle.speak(b).await.unwrap();

        let events = drive_until(&mut fx, |e| finished(e, b_id, FinishOutcome::Failed)).await;
        assert!(events.iter().any(|e| finished(e, a_id, FinishOutcome::Failed)));
        assert!(events.iter().any(|e| matches!(e,
            PlayerEvent::SessionFailed { utterance_id, .. } if *utterance_id == a_id)));
        assert!(events.iter().any(|e| matches!(e,
            PlayerEvent::UtteranceStarted { utterance_id, .. } if *utterance_id == b_id)));

        let snapshot = fx.handle.snapshot().await.unwrap();
        assert!(snapshot.current.is_none());
    }

    #[tokio::test]
    async fn test_queue_head_preloaded_and_replayed() {
        let mut fx = fixture(FakeTtsClientConfig::default(), true, true);
        let (a, b) = (request("First in line."), request("Second in line."));
        let b_id = b.id();

        fx.handle.speak(a).await.unwrap();
        fx.handle.speak(b).await.unwrap();

        // 时钟不动，A 无法播完，B 的预加载必然先完成
        let ready = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match fx.events.recv().await {
                    Ok(PlayerEvent::PreloadReady { utterance_id }) if utterance_id == b_id => break,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => panic!("publisher closed"),
                }
            }
        })
        .await;
        assert!(ready.is_ok());
        let snapshot = fx.handle.snapshot().await.unwrap();
        assert!(snapshot.queue[0].preloaded);

        let events = drive_until(&mut fx, |e| finished(e, b_id, FinishOutcome::Completed)).await;
        assert!(events.iter().any(|e| matches!(e,
            PlayerEvent::UtteranceStarted { utterance_id, from_cache: true, .. } if *utterance_id == b_id)));
        // A 的会话 + B 的预加载
        assert_eq!(fx.engine.stream_calls(), 2);
    }

    #[tokio::test]
    async fn test_pause_freezes_progress() {
        let mut fx = fixture(FakeTtsClientConfig::default(), false, false);
        let req = request("Pause me in the middle of this sentence please.");
        let id = req.id();
        fx.handle.speak(req).await.unwrap();
        drive_until(&mut fx, |e| {
            matches!(e, PlayerEvent::StateChanged { state: PlaybackState::Playing })
        })
        .await;

        fx.handle.pause().await.unwrap();
        let before = fx.handle.snapshot().await.unwrap();
        assert_eq!(before.state, PlaybackState::Paused);

        fx.device.advance(10.0);
        let after = fx.handle.snapshot().await.unwrap();
        assert_eq!(
            before.progress.unwrap().elapsed_secs,
            after.progress.unwrap().elapsed_secs
        );

        fx.handle.resume().await.unwrap();
        drive_until(&mut fx, |e| finished(e, id, FinishOutcome::Completed)).await;
    }

    #[tokio::test]
    async fn test_speak_after_stop_while_paused_resumes_clock() {
        let mut fx = fixture(FakeTtsClientConfig::default(), false, false);
        fx.handle.speak(request("Paused then stopped.")).await.unwrap();
        drive_until(&mut fx, |e| {
            matches!(e, PlayerEvent::StateChanged { state: PlaybackState::Playing })
        })
        .await;

        fx.handle.pause().await.unwrap();
        assert_eq!(fx.handle.stop().await.unwrap(), None);
        assert_eq!(fx.handle.snapshot().await.unwrap().state, PlaybackState::Idle);

        let next = request("Fresh start.");
        let next_id = next.id();
        fx.handle.speak(next).await.unwrap();
        assert!(!fx.scheduler.clock().is_suspended());
        drive_until(&mut fx, |e| finished(e, next_id, FinishOutcome::Completed)).await;
    }

    #[tokio::test]
    async fn test_remove_from_queue() {
        let fx = fixture(FakeTtsClientConfig::default(), true, false);
        fx.handle.speak(request("Current.")).await.unwrap();
        let queued = request("Queued.");
        let queued_id = queued.id();
        fx.handle.enqueue(queued).await.unwrap();

        let removed = fx.handle.remove_from_queue(0).await.unwrap();
        assert_eq!(removed.id(), queued_id);
        assert!(matches!(
            fx.handle.remove_from_queue(0).await,
            Err(PlaybackError::QueueIndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[tokio::test]
    async fn test_subscribe_progress_callback() {
        let mut fx = fixture(FakeTtsClientConfig::default(), false, false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = fx.handle.subscribe_progress(move |snapshot| {
            let _ = tx.send(snapshot);
        });

        let req = request("Progress please.");
        let id = req.id();
        fx.handle.speak(req).await.unwrap();
        drive_until(&mut fx, |e| finished(e, id, FinishOutcome::Completed)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut last = None;
        while let Ok(snapshot) = rx.try_recv() {
            last = Some(snapshot);
        }
        assert_eq!(last.unwrap().percent, 100.0);
    }
}
