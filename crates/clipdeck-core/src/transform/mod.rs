//! Offline transforms
//!
//! Every transform takes a finished [`AudioBuffer`](crate::types::AudioBuffer)
//! and returns a new one. Nothing here touches the real-time graph.

pub mod bitcrush;
pub mod denoise;
pub mod edit;
pub mod eq;
mod error;
pub mod gate;
pub mod render;
pub mod resample;
pub mod stretch;

pub use bitcrush::bitcrush;
pub use denoise::{reduce_noise, spectral_gate, NoiseModel};
pub use edit::{crop, crop_chop, crop_frames, normalize, reverse};
pub use eq::apply_eq;
pub use error::{TransformError, TransformResult};
pub use gate::apply_noise_gate_offline;
pub use render::{render, RenderOptions, StretchOptions};
pub use resample::resample;
pub use stretch::{time_stretch, time_stretch_preserving_pitch};
