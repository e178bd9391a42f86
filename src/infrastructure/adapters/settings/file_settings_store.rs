//! File Settings Store - JSON 文件设置存储
//!
//! 实现 SettingsStorePort trait

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::application::ports::{PlaybackSettings, SettingsError, SettingsStorePort};

/// JSON 文件设置存储
pub struct FileSettingsStore {
    path: PathBuf,
    /// 文件不存在时返回的设置
    defaults: PlaybackSettings,
}

impl FileSettingsStore {
    pub fn new(path: impl AsRef<Path>, defaults: PlaybackSettings) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            defaults,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStorePort for FileSettingsStore {
    async fn load(&self) -> Result<PlaybackSettings, SettingsError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Settings file not found, using defaults");
                return Ok(self.defaults.clone());
            }
            Err(e) => return Err(SettingsError::IoError(e.to_string())),
        };

        serde_json::from_str(&content).map_err(|e| SettingsError::SerializationError(e.to_string()))
    }

    async fn save(&self, settings: &PlaybackSettings) -> Result<(), SettingsError> {
        // 确保目录存在
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SettingsError::IoError(e.to_string()))?;
            }
        }

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| SettingsError::SerializationError(e.to_string()))?;

        fs::write(&self.path, content)
            .await
            .map_err(|e| SettingsError::IoError(e.to_string()))?;

        tracing::debug!(
            path = %self.path.display(),
            voice = %settings.voice,
            speed = settings.speed.value(),
            queue_enabled = settings.queue_enabled,
            "Settings saved"
        );
        Ok(())
    }
}
