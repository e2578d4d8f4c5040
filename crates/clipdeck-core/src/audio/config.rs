//! Audio backend configuration
//!
//! Device selection and stream settings for the capture and monitor streams.

use serde::{Deserialize, Serialize};

use crate::types::SAMPLE_RATE;

/// Maximum buffer size to pre-allocate (covers typical configurations)
/// Common values: 64, 128, 256, 512, 1024, 2048, 4096 frames
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Common low-latency buffer sizes to try, in order of preference (frames)
/// These translate to approximately:
/// - 64 frames @ 48kHz = ~1.3ms
/// - 128 frames @ 48kHz = ~2.7ms
/// - 256 frames @ 48kHz = ~5.3ms
/// - 512 frames @ 48kHz = ~10.7ms (safe default for most systems)
pub const LOW_LATENCY_BUFFER_SIZES: [u32; 4] = [64, 128, 256, 512];

/// Default buffer size when no preference is specified (frames)
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Default sample rate for both streams
///
/// Requested from the output device, which falls back to the closest rate
/// it supports. The input device must then run at that same rate, otherwise
/// [`start_audio_system`](super::start_audio_system) fails with
/// [`AudioError::SampleRateMismatch`](super::AudioError::SampleRateMismatch).
pub const DEFAULT_SAMPLE_RATE: u32 = SAMPLE_RATE;

/// Preferred buffer size for audio streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose the default buffer size
    #[default]
    Default,
    /// Request a specific buffer size in frames (may be adjusted by the system)
    Fixed(u32),
    /// Smallest size from [`LOW_LATENCY_BUFFER_SIZES`] the device accepts
    LowLatency,
}

impl BufferSize {
    /// Get the buffer size in frames, or None for system default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
            BufferSize::LowLatency => Some(LOW_LATENCY_BUFFER_SIZES[0]),
        }
    }

    /// Calculate latency in milliseconds for a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> Option<f32> {
        self.as_frames()
            .map(|frames| (frames as f32 / sample_rate as f32) * 1000.0)
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (ALSA, JACK, WASAPI...)
/// so a device can be picked from a specific host when several are available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host name; None searches every host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the capture (input) and monitor (output) streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture device (None = system default input)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<DeviceId>,

    /// Monitor/playback device (None = system default output)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<DeviceId>,

    /// Preferred buffer size
    pub buffer_size: BufferSize,

    /// Preferred sample rate for both streams
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            buffer_size: BufferSize::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl AudioConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            buffer_size: BufferSize::LowLatency,
            ..Default::default()
        }
    }

    /// Set the capture device
    pub fn with_input_device(mut self, device: DeviceId) -> Self {
        self.input_device = Some(device);
        self
    }

    /// Set the monitor device
    pub fn with_output_device(mut self, device: DeviceId) -> Self {
        self.output_device = Some(device);
        self
    }

    /// Set the preferred buffer size
    pub fn with_buffer_size(mut self, size: BufferSize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set a fixed buffer size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    /// Set the preferred sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }
}
