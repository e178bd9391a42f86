//! Synthesis Session - 单个朗读的合成与排播
//!
//! 状态机: Idle → Synthesizing → FirstChunkReady → Streaming → Complete，
//! 任意非终止状态可转为 Cancelled，出错时进入 Failed。
//!
//! 取消检查点：每次喂入分词前、每次等待引擎后、每次解码后、排播前。
//! 被取消的会话不发送完成事件。

use futures_util::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AudioDecoderPort, DecodeError, StreamRequest, SynthesisRequest, TtsEnginePort, TtsError,
};
use crate::domain::{
    estimate_duration, split_for_hybrid, tokenize_for_streaming, DecodedSegment,
    HybridSplitConfig, SynthesisMode, UtteranceRequest, DEFAULT_CHARS_PER_SECOND,
};
use crate::infrastructure::audio::{PlaybackLease, ScheduleError, SegmentScheduler};

/// 会话错误
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Synthesis failed: {0}")]
    Engine(#[from] TtsError),

    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Scheduling failed: {0}")]
    Schedule(ScheduleError),
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Synthesizing,
    FirstChunkReady,
    Streaming,
    Complete,
    Cancelled,
    Failed,
}

/// 会话向播放器报告的事件
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// 首个片段已排播
    FirstChunkReady { duration_secs: f64, start_at: f64 },
    /// 一个片段已排播，total_secs 为当前的总时长估计
    ChunkScheduled {
        text: String,
        duration_secs: f64,
        total_secs: f64,
        processed_chars: usize,
    },
    /// 总时长估计更新
    EstimateRefined { total_secs: f64, provisional: bool },
    /// 全部合成结束，total_secs 为实测总时长
    Complete { total_secs: f64 },
}

/// 会话结束方式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionOutcome {
    Completed { total_secs: f64 },
    Cancelled,
}

/// 会话配置
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: SynthesisMode,
    pub hybrid: HybridSplitConfig,
    /// 1.0x 语速下每秒字符数，用于时长估计
    pub chars_per_second: f64,
    /// 分词输入通道容量
    pub token_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SynthesisMode::Streaming,
            hybrid: HybridSplitConfig::default(),
            chars_per_second: DEFAULT_CHARS_PER_SECOND,
            token_buffer: 32,
        }
    }
}

/// 任务句柄被丢弃时中止任务
pub(crate) struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// 后台逐个喂入分词，全部送出或取消后关闭输入
pub(crate) fn spawn_token_feeder(
    tokens: Vec<String>,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> AbortOnDrop {
    AbortOnDrop(tokio::spawn(async move {
        for token in tokens {
            if cancel.is_cancelled() {
                break;
            }
            if tx.send(token).await.is_err() {
                break;
            }
        }
    }))
}

/// 单个朗读的合成会话
pub struct SynthesisSession {
    request: UtteranceRequest,
    config: SessionConfig,
    engine: Arc<dyn TtsEnginePort>,
    decoder: Arc<dyn AudioDecoderPort>,
    scheduler: Arc<SegmentScheduler>,
    lease: PlaybackLease,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: SessionState,
    /// 已排播音频的实测时长
    measured_secs: f64,
    processed_chars: usize,
    chunks: usize,
}

impl SynthesisSession {
    pub fn new(
        request: UtteranceRequest,
        config: SessionConfig,
        engine: Arc<dyn TtsEnginePort>,
        decoder: Arc<dyn AudioDecoderPort>,
        scheduler: Arc<SegmentScheduler>,
        lease: PlaybackLease,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            request,
            config,
            engine,
            decoder,
            scheduler,
            lease,
            cancel: CancellationToken::new(),
            events,
            state: SessionState::Idle,
            measured_secs: 0.0,
            processed_chars: 0,
            chunks: 0,
        }
    }

    /// 取消令牌，取消是幂等的
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn request(&self) -> &UtteranceRequest {
        &self.request
    }

    /// 开始播放前的总时长估计（已按语速换算）
    pub fn initial_estimate(&self) -> f64 {
        self.estimate_secs(self.request.text())
    }

    fn estimate_secs(&self, text: &str) -> f64 {
        estimate_duration(text, self.config.chars_per_second) / self.request.speed().value()
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!(utterance_id = %self.request.id(), "Session event dropped (no receiver)");
        }
    }

    /// 运行会话直到合成结束、取消或失败
    pub async fn run(&mut self) -> Result<SessionOutcome, SessionError> {
        if self.state != SessionState::Idle {
            return Ok(SessionOutcome::Cancelled);
        }
        self.state = SessionState::Synthesizing;

        tracing::debug!(
            utterance_id = %self.request.id(),
            mode = self.config.mode.as_str(),
            chars = self.request.char_count(),
            voice = %self.request.voice(),
            speed = self.request.speed().value(),
            "Synthesis session started"
        );

        let result = match self.config.mode {
            SynthesisMode::Whole => self.run_whole().await,
            SynthesisMode::Streaming => {
                let text = self.request.text().to_string();
                self.stream_part(&text).await
            }
            SynthesisMode::Hybrid => self.run_hybrid().await,
        };

        match result {
            Ok(true) => {
                self.state = SessionState::Complete;
                let total_secs = self.measured_secs;
                self.emit(SessionEvent::Complete { total_secs });
                tracing::debug!(
                    utterance_id = %self.request.id(),
                    chunks = self.chunks,
                    total_secs,
                    "Synthesis session complete"
                );
                Ok(SessionOutcome::Completed { total_secs })
            }
            Ok(false) => {
                self.state = SessionState::Cancelled;
                tracing::debug!(utterance_id = %self.request.id(), "Synthesis session cancelled");
                Ok(SessionOutcome::Cancelled)
            }
            Err(e) => {
                if self.cancel.is_cancelled() {
                    self.state = SessionState::Cancelled;
                    return Ok(SessionOutcome::Cancelled);
                }
                self.state = SessionState::Failed;
                tracing::warn!(utterance_id = %self.request.id(), error = %e, "Synthesis session failed");
                Err(e)
            }
        }
    }

    /// 整段合成，返回 false 表示已取消
    async fn run_whole(&mut self) -> Result<bool, SessionError> {
        let request = SynthesisRequest {
            text: self.request.text().to_string(),
            voice: self.request.voice().clone(),
            speed: self.request.speed(),
        };

        let audio = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(false),
            result = self.engine.synthesize(request) => result?,
        };
        if self.cancel.is_cancelled() {
            return Ok(false);
        }

        let segment = self.decoder.decode(&audio.audio).await?;
        if self.cancel.is_cancelled() {
            return Ok(false);
        }

        let text = self.request.text().to_string();
        self.schedule_chunk(text, &segment, None)
    }

    /// 混合模式：先流式合成首段，再合成其余部分
    async fn run_hybrid(&mut self) -> Result<bool, SessionError> {
        let split = split_for_hybrid(self.request.text(), &self.config.hybrid);

        if !self.stream_part(&split.first).await? {
            return Ok(false);
        }
        if split.second.is_empty() {
            return Ok(true);
        }

        // 首段实测 + 其余部分估计
        let total_secs = self.measured_secs + self.estimate_secs(&split.second);
        self.emit(SessionEvent::EstimateRefined {
            total_secs,
            provisional: true,
        });

        self.stream_part(&split.second).await
    }

    /// 流式合成一段文本，返回 false 表示已取消
    async fn stream_part(&mut self, text: &str) -> Result<bool, SessionError> {
        let (tx, rx) = mpsc::channel(self.config.token_buffer.max(1));
        let request = StreamRequest {
            voice: self.request.voice().clone(),
            speed: self.request.speed(),
            input: rx,
        };

        // 引擎可能在读完请求体之后才返回流，喂入必须先于等待
        let _feeder = spawn_token_feeder(tokenize_for_streaming(text), tx, self.cancel.clone());

        let mut chunks = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(false),
            result = self.engine.synthesize_stream(request) => result?,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(false),
                next = chunks.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            if self.cancel.is_cancelled() {
                return Ok(false);
            }

            let segment = self.decoder.decode(&chunk.audio).await?;
            if self.cancel.is_cancelled() {
                return Ok(false);
            }

            let chars = chunk.text.chars().count();
            if !self.schedule_chunk(chunk.text, &segment, Some(chars))? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// 排播一个片段并报告进度，返回 false 表示租约已失效
    ///
    /// `chars` 为该片段覆盖的字符数；`None` 表示整段合成，全部文本已处理
    fn schedule_chunk(
        &mut self,
        text: String,
        segment: &DecodedSegment,
        chars: Option<usize>,
    ) -> Result<bool, SessionError> {
        let scheduled = match self.scheduler.schedule_segment(&self.lease, segment, 1.0) {
            Ok(scheduled) => scheduled,
            Err(ScheduleError::LeaseRevoked) => return Ok(false),
            Err(e) => return Err(SessionError::Schedule(e)),
        };

        let duration_secs = segment.duration_secs();
        self.measured_secs += duration_secs;
        self.chunks += 1;
        self.processed_chars = match chars {
            Some(chars) => (self.processed_chars + chars).min(self.request.char_count()),
            None => self.request.char_count(),
        };

        if self.chunks == 1 {
            self.state = SessionState::FirstChunkReady;
            self.emit(SessionEvent::FirstChunkReady {
                duration_secs,
                start_at: scheduled.start_at,
            });
        } else {
            self.state = SessionState::Streaming;
        }

        let remaining_chars = self.request.char_count().saturating_sub(self.processed_chars);
        let remaining_secs = if self.config.chars_per_second > 0.0 {
            remaining_chars as f64 / self.config.chars_per_second / self.request.speed().value()
        } else {
            0.0
        };

        tracing::trace!(
            utterance_id = %self.request.id(),
            chunk = self.chunks,
            duration_secs,
            start_at = scheduled.start_at,
            "Chunk scheduled"
        );

        self.emit(SessionEvent::ChunkScheduled {
            text,
            duration_secs,
            total_secs: self.measured_secs + remaining_secs,
            processed_chars: self.processed_chars,
        });
        Ok(true)
    }
}
