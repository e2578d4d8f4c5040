//! Default locations for the config file and recordings

use std::path::PathBuf;

const APP_DIR: &str = "clipdeck";

/// `~/.config/clipdeck/config.yaml` (platform config dir, home as fallback)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.yaml")
}

/// `~/Music/clipdeck`, where recordings and exports are written
pub fn default_recordings_path() -> PathBuf {
    dirs::audio_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Music")
        })
        .join(APP_DIR)
}
