//! YAML load/save for any serde configuration type

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load a configuration from a YAML file
///
/// A missing file yields the defaults. A file that can't be read or parsed
/// is logged and also yields the defaults, so a broken config never stops
/// the engine from starting.
///
/// ```ignore
/// let config: ClipdeckConfig = load_config(&default_config_path());
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("load_config: {:?} not found, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("load_config: failed to read {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("load_config: loaded {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("load_config: failed to parse {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Save a configuration as YAML, creating parent directories as needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: saved {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClipdeckConfig;
    use crate::params::BitDepth;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: ClipdeckConfig = load_config(Path::new("/nonexistent/clipdeck/config.yaml"));
        assert_eq!(config, ClipdeckConfig::default());
    }

    #[test]
    fn test_roundtrip_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = ClipdeckConfig::default();
        config.engine.threshold = 42.0;
        config.engine.recording_bit_depth = BitDepth::TwentyFour;
        config.audio.sample_rate = 44100;

        save_config(&config, &path).unwrap();
        let loaded: ClipdeckConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "engine:\n  recording_bit_depth: 12\n").unwrap();

        let loaded: ClipdeckConfig = load_config(&path);
        assert_eq!(loaded, ClipdeckConfig::default());
    }
}
