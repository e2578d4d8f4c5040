//! Configuration for clipdeck
//!
//! One YAML file holds the audio device setup and the engine defaults:
//!
//! ```yaml
//! audio:
//!   input_device: { name: "Scarlett 2i2", host: ALSA }
//!   buffer_size: LowLatency
//! engine:
//!   threshold: 20.0
//!   recording_bit_depth: 24
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use clipdeck_core::config::{default_config_path, load_config, save_config, ClipdeckConfig};
//!
//! let config: ClipdeckConfig = load_config(&default_config_path());
//! save_config(&config, &default_config_path())?;
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{default_config_path, default_recordings_path};

use serde::{Deserialize, Serialize};

use crate::analysis::BpmRange;
use crate::audio::AudioConfig;
use crate::params::{BitDepth, EqSettings, GateSettings, Mp3Bitrate};

/// Default auto-record threshold (0 - 100)
pub const DEFAULT_THRESHOLD: f32 = 20.0;

/// Default time to wait for the input stream to confirm the end of a take
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 250;

/// Top-level config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipdeckConfig {
    pub audio: AudioConfig,
    pub engine: EngineConfig,
}

/// Recording, playback and analysis defaults of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Auto-record threshold, 0 - 100 (maps to 0.0 - 1.0 peak)
    pub threshold: f32,
    pub recording_bit_depth: BitDepth,
    pub mp3_bitrate: Mp3Bitrate,
    /// Fade voices out when they are stopped early
    pub stop_fade: bool,
    pub bpm_range: BpmRange,
    pub recorder_flush_timeout_ms: u64,
    pub eq: EqSettings,
    pub gate: GateSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            recording_bit_depth: BitDepth::default(),
            mp3_bitrate: Mp3Bitrate::default(),
            stop_fade: true,
            bpm_range: BpmRange::default(),
            recorder_flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT_MS,
            eq: EqSettings::default(),
            gate: GateSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Threshold as a peak amplitude, clamped to 0.0 - 1.0
    pub fn threshold_amplitude(&self) -> f32 {
        threshold_to_amplitude(self.threshold)
    }
}

/// Map a 0 - 100 threshold to a 0.0 - 1.0 peak amplitude
pub fn threshold_to_amplitude(threshold: f32) -> f32 {
    if threshold.is_nan() {
        return 0.0;
    }
    threshold.clamp(0.0, 100.0) / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.threshold, 20.0);
        assert_eq!(config.recording_bit_depth, BitDepth::Sixteen);
        assert_eq!(config.mp3_bitrate, Mp3Bitrate::Kbps192);
        assert!(config.stop_fade);
        assert_eq!(config.bpm_range.min, 60.0);
        assert_eq!(config.bpm_range.max, 200.0);
        assert!((config.threshold_amplitude() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_mapping_clamps() {
        assert_eq!(threshold_to_amplitude(-5.0), 0.0);
        assert_eq!(threshold_to_amplitude(150.0), 1.0);
        assert_eq!(threshold_to_amplitude(50.0), 0.5);
        assert_eq!(threshold_to_amplitude(f32::NAN), 0.0);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "engine:\n  threshold: 35\n  recording_bit_depth: 24\n";
        let config: ClipdeckConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.engine.threshold, 35.0);
        assert_eq!(config.engine.recording_bit_depth, BitDepth::TwentyFour);
        assert_eq!(config.engine.mp3_bitrate, Mp3Bitrate::Kbps192);
        assert_eq!(config.audio, AudioConfig::default());
    }
}
