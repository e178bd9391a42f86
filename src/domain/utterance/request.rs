//! Utterance Context - 朗读请求实体

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{RequestKey, Speed, UtteranceError, Voice};

/// 朗读请求
///
/// 创建后不可变。`id` 仅作为句柄，不参与请求身份比较。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtteranceRequest {
    id: Uuid,
    text: String,
    voice: Voice,
    speed: Speed,
    requested_at: DateTime<Utc>,
}

impl UtteranceRequest {
    /// 创建朗读请求（文本去除首尾空白后不能为空）
    pub fn new(text: impl Into<String>, voice: Voice, speed: Speed) -> Result<Self, UtteranceError> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(UtteranceError::EmptyText);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            text: trimmed.to_string(),
            voice,
            speed,
            requested_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice(&self) -> &Voice {
        &self.voice
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// 请求身份
    pub fn key(&self) -> RequestKey {
        RequestKey {
            text: self.text.clone(),
            voice: self.voice.clone(),
            speed: self.speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_rejected() {
        let result = UtteranceRequest::new("  \n\t ", Voice::default(), Speed::NORMAL);
        assert_eq!(result.unwrap_err(), UtteranceError::EmptyText);
    }

    #[test]
    fn test_identity_ignores_id() {
        let a = UtteranceRequest::new("Hello there.", Voice::default(), Speed::NORMAL).unwrap();
        let b = UtteranceRequest::new(" Hello there. ", Voice::default(), Speed::NORMAL).unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(a.key(), b.key());
        assert_eq!(a.text(), "Hello there.");
    }

    #[test]
    fn test_char_count_counts_chars() {
        let request = UtteranceRequest::new("héllo", Voice::default(), Speed::NORMAL).unwrap();
        assert_eq!(request.char_count(), 5);
    }
}
