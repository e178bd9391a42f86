//! 应用层错误定义
//!
//! 统一的命令/查询错误类型

use thiserror::Error;

use crate::application::ports::{PlaybackError, SettingsError};
use crate::domain::UtteranceError;

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 状态无效
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 外部服务错误（音频设备等）
    #[error("External service error: {0}")]
    ExternalServiceError(String),

    /// 存储错误
    #[error("Storage error: {0}")]
    StorageError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// 创建状态无效错误
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }
}

impl From<UtteranceError> for ApplicationError {
    fn from(err: UtteranceError) -> Self {
        Self::ValidationError(err.to_string())
    }
}

impl From<PlaybackError> for ApplicationError {
    fn from(err: PlaybackError) -> Self {
        match err {
            PlaybackError::QueueIndexOutOfRange { index, .. } => {
                Self::not_found("Queue item", index)
            }
            PlaybackError::PlayerStopped => Self::InvalidState(err.to_string()),
            PlaybackError::Device(msg) => Self::ExternalServiceError(msg),
        }
    }
}

impl From<SettingsError> for ApplicationError {
    fn from(err: SettingsError) -> Self {
        Self::StorageError(err.to_string())
    }
}
