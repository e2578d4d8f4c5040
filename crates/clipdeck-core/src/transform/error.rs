//! Transform error types

use thiserror::Error;

use crate::types::BufferError;

/// Errors raised by offline transforms
///
/// Every variant except `Resample` is a validation failure reported before any
/// processing starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("Buffer is empty")]
    EmptyBuffer,

    #[error("Region {start}..{end} of a {len}-frame buffer contains no frames")]
    EmptyRegion { start: usize, end: usize, len: usize },

    #[error("Invalid sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    #[error("Invalid stretch ratio: {0} (must be finite and > 0)")]
    InvalidRatio(f64),

    #[error("Invalid bit depth: {0} (expected 1-24)")]
    InvalidBitDepth(u8),

    #[error("Invalid {name}: {value} (expected 0.0-1.0)")]
    InvalidParameter { name: &'static str, value: f32 },

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Result type for transforms
pub type TransformResult<T> = Result<T, TransformError>;

/// Validate a unit-range parameter
pub(crate) fn check_unit(name: &'static str, value: f32) -> TransformResult<f32> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(TransformError::InvalidParameter { name, value })
    }
}
