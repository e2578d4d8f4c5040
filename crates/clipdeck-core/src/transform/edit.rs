//! Structural edits: crop, normalize, reverse

use crate::types::{AudioBuffer, Chop, Region};

use super::error::{TransformError, TransformResult};

/// Copy the frames covered by `region`
///
/// Both edges truncate to whole frames. Fails with `EmptyRegion` if nothing
/// is left.
pub fn crop(buffer: &AudioBuffer, region: Region) -> TransformResult<AudioBuffer> {
    let range = region.frame_range(buffer.len());
    crop_frames(buffer, range.start, range.end)
}

/// Copy frames `start..end`, clamping `end` to the buffer length
pub fn crop_frames(buffer: &AudioBuffer, start: usize, end: usize) -> TransformResult<AudioBuffer> {
    let len = buffer.len();
    let end = end.min(len);
    if start >= end {
        return Err(TransformError::EmptyRegion { start, end, len });
    }

    let channels = buffer
        .channels()
        .iter()
        .map(|channel| channel[start..end].to_vec())
        .collect();
    Ok(buffer.with_channels(channels)?)
}

/// Crop to a chop, preferring its explicit frame pair over its fractional region
pub fn crop_chop(buffer: &AudioBuffer, chop: &Chop) -> TransformResult<AudioBuffer> {
    let range = chop.frame_range(buffer.len());
    crop_frames(buffer, range.start, range.end)
}

/// Scale so the loudest sample across all channels hits 1.0
///
/// Silent buffers come back unchanged.
pub fn normalize(buffer: &AudioBuffer) -> AudioBuffer {
    let peak = buffer.peak();
    if peak == 0.0 || !peak.is_finite() {
        return buffer.clone();
    }
    let gain = 1.0 / peak;
    log::debug!("normalize: peak {:.4}, gain {:.4}", peak, gain);

    let channels = buffer
        .channels()
        .iter()
        .map(|channel| channel.iter().map(|&s| s * gain).collect())
        .collect();
    AudioBuffer::new(buffer.sample_rate(), channels).unwrap_or_else(|_| buffer.clone())
}

/// Reverse every channel
pub fn reverse(buffer: &AudioBuffer) -> AudioBuffer {
    let channels = buffer
        .channels()
        .iter()
        .map(|channel| channel.iter().rev().copied().collect())
        .collect();
    AudioBuffer::new(buffer.sample_rate(), channels).unwrap_or_else(|_| buffer.clone())
}
