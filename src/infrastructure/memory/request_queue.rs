//! Request Queue - 朗读请求排队与准入
//!
//! 阶段: Idle → Starting → Playing，打断时 Playing → Stopping → Idle → Starting。
//! 当前朗读不在队列中。

use std::collections::VecDeque;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::UtteranceRequest;

/// 队列错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// 队列阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    Idle,
    Starting,
    Playing,
    Stopping,
}

/// 准入结果
#[derive(Debug, Clone, PartialEq)]
pub enum AdmitDecision {
    /// 立即开始，请求已成为当前朗读
    Start(UtteranceRequest),
    /// 已追加到队尾
    Enqueued { position: usize },
    /// 需要先停止当前朗读，之后调用 `finish_stop`
    ///
    /// 已在 Stopping 阶段时 stopped 为 None，新请求替换待开始的请求
    Interrupt { stopped: Option<Uuid> },
}

/// 当前朗读结束后的推进结果
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Next(UtteranceRequest),
    Idle,
    /// 结束的不是当前朗读，忽略
    Stale,
}

#[derive(Debug)]
pub struct RequestQueue {
    phase: QueuePhase,
    current: Option<UtteranceRequest>,
    pending_start: Option<UtteranceRequest>,
    items: VecDeque<UtteranceRequest>,
    queue_enabled: bool,
}

impl RequestQueue {
    pub fn new(queue_enabled: bool) -> Self {
        Self {
            phase: QueuePhase::Idle,
            current: None,
            pending_start: None,
            items: VecDeque::new(),
            queue_enabled,
        }
    }

    pub fn phase(&self) -> QueuePhase {
        self.phase
    }

    pub fn current(&self) -> Option<&UtteranceRequest> {
        self.current.as_ref()
    }

    pub fn is_current(&self, id: Uuid) -> bool {
        self.current.as_ref().map(|r| r.id() == id).unwrap_or(false)
    }

    pub fn queue_enabled(&self) -> bool {
        self.queue_enabled
    }

    pub fn set_queue_enabled(&mut self, enabled: bool) {
        self.queue_enabled = enabled;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &UtteranceRequest> {
        self.items.iter()
    }

    /// 预加载候选：队首
    pub fn head(&self) -> Option<&UtteranceRequest> {
        self.items.front()
    }

    fn start(&mut self, request: UtteranceRequest) -> AdmitDecision {
        self.current = Some(request.clone());
        self.phase = QueuePhase::Starting;
        AdmitDecision::Start(request)
    }

    fn push(&mut self, request: UtteranceRequest) -> AdmitDecision {
        self.items.push_back(request);
        AdmitDecision::Enqueued {
            position: self.items.len() - 1,
        }
    }

    /// 新请求准入
    ///
    /// 无当前朗读时立即开始；启用排队时追加；否则打断当前朗读并清空队列。
    pub fn admit(&mut self, request: UtteranceRequest) -> AdmitDecision {
        if self.phase == QueuePhase::Stopping {
            if let Some(replaced) = self.pending_start.replace(request) {
                tracing::debug!(replaced = %replaced.id(), "Pending start replaced while stopping");
            }
            return AdmitDecision::Interrupt { stopped: None };
        }

        let Some(current) = self.current.as_ref() else {
            return self.start(request);
        };

        if self.queue_enabled {
            return self.push(request);
        }

        let stopped = current.id();
        let cleared = self.items.len();
        self.current = None;
        self.items.clear();
        self.pending_start = Some(request);
        self.phase = QueuePhase::Stopping;
        tracing::debug!(stopped = %stopped, cleared, "Interrupting current utterance");

        AdmitDecision::Interrupt {
            stopped: Some(stopped),
        }
    }

    /// 追加到队尾，空闲时立即开始
    pub fn enqueue(&mut self, request: UtteranceRequest) -> AdmitDecision {
        if self.current.is_none() && self.phase == QueuePhase::Idle {
            return self.start(request);
        }
        self.push(request)
    }

    /// 停止完成：Stopping → Idle，有待开始的请求时 → Starting
    pub fn finish_stop(&mut self) -> Option<UtteranceRequest> {
        if self.phase != QueuePhase::Stopping {
            return None;
        }
        self.phase = QueuePhase::Idle;
        let request = self.pending_start.take()?;
        self.current = Some(request.clone());
        self.phase = QueuePhase::Starting;
        Some(request)
    }

    /// 当前朗读开始出声：Starting → Playing
    pub fn mark_started(&mut self, id: Uuid) -> bool {
        if self.phase == QueuePhase::Starting && self.is_current(id) {
            self.phase = QueuePhase::Playing;
            return true;
        }
        false
    }

    /// 当前朗读结束（自然结束或被停止），推进到队首
    pub fn advance(&mut self, finished: Uuid) -> Advance {
        if !self.is_current(finished) {
            tracing::debug!(finished = %finished, "Ignoring stale completion");
            return Advance::Stale;
        }

        match self.items.pop_front() {
            Some(next) => {
                self.current = Some(next.clone());
                self.phase = QueuePhase::Starting;
                Advance::Next(next)
            }
            None => {
                self.current = None;
                self.phase = QueuePhase::Idle;
                Advance::Idle
            }
        }
    }

    /// 移除尚未开始的排队项
    pub fn remove_at(&mut self, index: usize) -> Result<UtteranceRequest, QueueError> {
        let len = self.items.len();
        self.items
            .remove(index)
            .ok_or(QueueError::IndexOutOfRange { index, len })
    }

    pub fn clear(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        count
    }
}
