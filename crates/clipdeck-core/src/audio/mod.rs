//! CPAL audio backend for clipdeck
//!
//! Opens a capture stream and a monitor stream and hosts the real-time graph
//! in their callbacks.
//!
//! # Architecture
//!
//! The audio system follows a lock-free design for real-time safety:
//!
//! - **Control Thread**: Owns the `GraphHandle`, sends commands via a lock-free ringbuffer
//! - **Input Thread**: Owns the `InputGraph` (meters + recorder tap)
//! - **Output Thread**: Owns the `OutputGraph` (voices + processing chain)
//! - **Atomics**: Levels, voice count and mute state are read without locks
//!
//! # Example Usage
//!
//! ```ignore
//! use clipdeck_core::audio::{start_audio_system, AudioConfig};
//!
//! let config = AudioConfig::default();
//! let system = start_audio_system(&config, &EqSettings::default(), &GateSettings::default())?;
//!
//! // Read levels via atomics (no locks)
//! let peak = system.graph.meters().input_peak();
//! ```

mod config;
mod cpal_backend;
mod device;
mod error;

pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, LOW_LATENCY_BUFFER_SIZES,
    MAX_BUFFER_SIZE,
};

pub use cpal_backend::{start_audio_system, AudioSystem, CpalAudioHandle};

pub use device::{find_device_by_id, get_input_devices, get_output_devices, list_devices, AudioDevice, Direction};

pub use error::{AudioError, AudioResult};
