//! Bit depth reduction

use crate::types::AudioBuffer;

use super::error::{TransformError, TransformResult};

/// Highest supported crush depth
pub const MAX_CRUSH_BITS: u8 = 24;

/// Quantize a single sample onto the centered `2^bits` grid
#[inline]
fn crush_sample(sample: f32, levels: f64, step: f64) -> f32 {
    let sample = if sample.is_nan() { 0.0 } else { sample as f64 };
    let index = ((sample + 1.0) / step).floor().clamp(0.0, levels - 1.0);
    ((index + 0.5) * step - 1.0) as f32
}

/// Quantize every sample to `2^bits` evenly spaced levels over [-1, 1]
///
/// Levels sit at the centre of each step, so the grid never contains 0.0 and
/// a second pass with the same depth changes nothing.
pub fn bitcrush(buffer: &AudioBuffer, bits: u8) -> TransformResult<AudioBuffer> {
    if bits == 0 || bits > MAX_CRUSH_BITS {
        return Err(TransformError::InvalidBitDepth(bits));
    }
    let levels = (1u32 << bits) as f64;
    let step = 2.0 / levels;

    let channels = buffer
        .channels()
        .iter()
        .map(|channel| channel.iter().map(|&s| crush_sample(s, levels, step)).collect())
        .collect();
    Ok(buffer.with_channels(channels)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_bit_has_two_levels() {
        let buffer = AudioBuffer::mono(8000, vec![-1.0, -0.2, 0.0, 0.3, 1.0, 2.0]).unwrap();
        let crushed = bitcrush(&buffer, 1).unwrap();
        assert_eq!(crushed.channel(0), &[-0.5, -0.5, 0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_two_bits_centered_levels() {
        let buffer = AudioBuffer::mono(8000, vec![-0.9, -0.4, 0.1, 0.6]).unwrap();
        let crushed = bitcrush(&buffer, 2).unwrap();
        assert_eq!(crushed.channel(0), &[-0.75, -0.25, 0.25, 0.75]);
    }

    #[test]
    fn test_sixteen_bit_crush_is_idempotent() {
        let samples: Vec<f32> = (0..4096).map(|i| ((i as f32) * 0.0137).sin() * 0.93).collect();
        let buffer = AudioBuffer::new(44100, vec![samples.clone(), samples]).unwrap();
        let once = bitcrush(&buffer, 16).unwrap();
        let twice = bitcrush(&once, 16).unwrap();
        assert_eq!(once, twice);
        assert_ne!(once, buffer);
    }

    #[test]
    fn test_invalid_depths() {
        let buffer = AudioBuffer::mono(8000, vec![0.0]).unwrap();
        assert_eq!(bitcrush(&buffer, 0), Err(TransformError::InvalidBitDepth(0)));
        assert_eq!(bitcrush(&buffer, 25), Err(TransformError::InvalidBitDepth(25)));
    }
}
