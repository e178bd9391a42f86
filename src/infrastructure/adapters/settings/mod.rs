//! Settings Adapter - 播放设置持久化

mod file_settings_store;

pub use file_settings_store::FileSettingsStore;
