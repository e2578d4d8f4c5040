//! Clipdeck Core - capture, chop and process audio samples
//!
//! - `codec`, `transform`, `analysis`: offline work on finished buffers
//! - `graph`, `audio`: the real-time capture/playback path
//! - `engine`: the recording state machine driving the graph

pub mod analysis;
pub mod audio;
pub mod codec;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod graph;
pub mod params;
pub mod transform;
pub mod types;

pub use types::*;
