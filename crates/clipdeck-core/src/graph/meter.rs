//! Lock-free level meters
//!
//! The audio callbacks publish per-block peak and RMS as `f32` bit patterns in
//! atomics; the UI and the engine read them without locks. Non-negative floats
//! order the same way as their bit patterns, so the input peak-hold can use
//! `fetch_max` directly.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::{Sample, StereoBuffer};

/// Peak and RMS of one channel over the last block
#[derive(Debug, Default)]
pub struct ChannelMeter {
    peak: AtomicU32,
    rms: AtomicU32,
}

impl ChannelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peak of the last block (lock-free)
    #[inline]
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    /// RMS of the last block (lock-free)
    #[inline]
    pub fn rms(&self) -> f32 {
        f32::from_bits(self.rms.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, peak: f32, rms: f32) {
        self.peak.store(peak.to_bits(), Ordering::Relaxed);
        self.rms.store(rms.to_bits(), Ordering::Relaxed);
    }
}

/// All meters of one graph
#[derive(Debug)]
pub struct MeterAtomics {
    input: Vec<ChannelMeter>,
    /// Highest input peak since the last `take_input_peak`
    input_peak_hold: AtomicU32,
    output: [ChannelMeter; 2],
}

impl MeterAtomics {
    pub fn new(input_channels: usize) -> Self {
        Self {
            input: (0..input_channels).map(|_| ChannelMeter::new()).collect(),
            input_peak_hold: AtomicU32::new(0),
            output: [ChannelMeter::new(), ChannelMeter::new()],
        }
    }

    pub fn input_channels(&self) -> usize {
        self.input.len()
    }

    pub fn input(&self, channel: usize) -> Option<&ChannelMeter> {
        self.input.get(channel)
    }

    pub fn output(&self, channel: usize) -> Option<&ChannelMeter> {
        self.output.get(channel)
    }

    /// Loudest input channel of the last block, leaving the hold untouched
    pub fn input_peak(&self) -> f32 {
        self.input.iter().map(ChannelMeter::peak).fold(0.0, f32::max)
    }

    /// Loudest output channel of the last block
    pub fn output_peak(&self) -> f32 {
        self.output.iter().map(ChannelMeter::peak).fold(0.0, f32::max)
    }

    /// Highest input peak since the previous call, resetting the hold
    pub fn take_input_peak(&self) -> f32 {
        f32::from_bits(self.input_peak_hold.swap(0, Ordering::AcqRel))
    }

    /// Publish levels of an interleaved input block (audio thread)
    pub fn record_input(&self, interleaved: &[Sample], channels: usize) {
        if channels == 0 || interleaved.is_empty() {
            return;
        }
        let frames = interleaved.len() / channels;
        let mut block_peak = 0.0f32;

        for (channel, meter) in self.input.iter().enumerate().take(channels) {
            let mut peak = 0.0f32;
            let mut sum_sq = 0.0f32;
            for frame in interleaved.chunks_exact(channels) {
                let s = frame[channel];
                peak = peak.max(s.abs());
                sum_sq += s * s;
            }
            meter.store(peak, (sum_sq / frames.max(1) as f32).sqrt());
            block_peak = block_peak.max(peak);
        }

        if block_peak.is_finite() {
            self.input_peak_hold.fetch_max(block_peak.to_bits(), Ordering::AcqRel);
        }
    }

    /// Publish levels of an output block (audio thread)
    pub fn record_output(&self, buffer: &StereoBuffer) {
        let len = buffer.len().max(1) as f32;
        let (mut peak_l, mut peak_r, mut sq_l, mut sq_r) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
        for sample in buffer.as_slice() {
            peak_l = peak_l.max(sample.left.abs());
            peak_r = peak_r.max(sample.right.abs());
            sq_l += sample.left * sample.left;
            sq_r += sample.right * sample.right;
        }
        self.output[0].store(peak_l, (sq_l / len).sqrt());
        self.output[1].store(peak_r, (sq_r / len).sqrt());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_levels_per_channel() {
        let meters = MeterAtomics::new(2);
        meters.record_input(&[0.5, -0.25, -0.5, 0.25], 2);

        let left = meters.input(0).unwrap();
        assert_eq!(left.peak(), 0.5);
        assert!((left.rms() - 0.5).abs() < 1e-6);
        assert_eq!(meters.input(1).unwrap().peak(), 0.25);
        assert_eq!(meters.input_peak(), 0.5);
    }

    #[test]
    fn test_peak_hold_is_consumed() {
        let meters = MeterAtomics::new(1);
        meters.record_input(&[0.8, 0.1], 1);
        meters.record_input(&[0.2, 0.1], 1);

        // The last block is quieter, the hold still has the earlier peak
        assert_eq!(meters.input_peak(), 0.2);
        assert_eq!(meters.take_input_peak(), 0.8);
        assert_eq!(meters.take_input_peak(), 0.0);
    }

    #[test]
    fn test_output_levels() {
        let meters = MeterAtomics::new(1);
        let mut buffer = StereoBuffer::silence(4);
        buffer[1].left = -0.7;
        buffer[2].right = 0.3;
        meters.record_output(&buffer);
        assert_eq!(meters.output(0).unwrap().peak(), 0.7);
        assert_eq!(meters.output(1).unwrap().peak(), 0.3);
        assert_eq!(meters.output_peak(), 0.7);
    }
}
