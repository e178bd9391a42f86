//! Utterance Context - Errors

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum UtteranceError {
    #[error("朗读文本不能为空")]
    EmptyText,

    #[error("无效的语速: {0}")]
    InvalidSpeed(f64),

    #[error("无效的音色: {0}")]
    InvalidVoice(String),
}
