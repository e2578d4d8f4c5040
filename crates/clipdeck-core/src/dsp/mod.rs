//! Sample-level building blocks shared by the live chain and offline transforms
//!
//! Everything here is allocation-free once constructed, so the same types run
//! inside the audio callback and inside the offline renderer.

pub mod biquad;
pub mod gate;
pub mod smooth;
pub mod spectrum;

pub use biquad::{BiquadCoeffs, BiquadState};
pub use gate::{EnvelopeFollower, GateProcessor};
pub use smooth::SmoothedParam;
pub use spectrum::{hann_window, MagnitudeAnalyzer};
