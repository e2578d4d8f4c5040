//! Common types for clipdeck
//!
//! This module contains the fundamental audio types shared by the codec,
//! the offline transforms, the estimators and the real-time graph:
//!
//! - [`AudioBuffer`]: immutable, planar, validated sample buffer. Every offline
//!   operation takes one by reference and returns a new one.
//! - [`Region`] / [`Chop`]: fractional trim windows over a buffer.
//! - [`StereoSample`] / [`StereoBuffer`]: interleaved scratch buffers used inside
//!   the audio callback, where allocation is not allowed.

use std::ops::{Index, IndexMut, Range};

use thiserror::Error;

/// Default sample rate used when a device does not dictate one (48kHz)
pub const SAMPLE_RATE: u32 = 48000;

/// Highest MIDI-style key a chop can be assigned to
pub const MAX_CHOP_KEY: u8 = 127;

/// Audio sample type (32-bit float for processing)
pub type Sample = f32;

/// Errors raised while constructing buffers or trim windows
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("Invalid sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    #[error("Audio buffer needs at least one channel")]
    NoChannels,

    #[error("Channel {channel} has {found} frames, expected {expected}")]
    ChannelLengthMismatch {
        channel: usize,
        expected: usize,
        found: usize,
    },

    #[error("Interleaved data length {len} is not a multiple of {channels} channels")]
    InterleavedLength { len: usize, channels: usize },

    #[error("Invalid region: start={start}, end={end} (need 0 <= start < end <= 1)")]
    InvalidRegion { start: f64, end: f64 },

    #[error("Invalid frame range: {start}..{end}")]
    InvalidFrameRange { start: usize, end: usize },

    #[error("Chop key {0} out of range (0-127)")]
    InvalidKey(u8),
}

/// Result type for buffer construction
pub type BufferResult<T> = Result<T, BufferError>;

// ═══════════════════════════════════════════════════════════════════════════════
// AudioBuffer
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable planar audio buffer
///
/// Invariants (checked by every constructor):
/// - sample rate > 0
/// - at least one channel
/// - all channels have the same number of frames
///
/// Samples are conventionally in [-1, 1] but are not clamped until encode time.
/// There is no `&mut` access to the sample data: transforms build a new buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<Sample>>,
}

impl AudioBuffer {
    /// Create a buffer from per-channel sample vectors
    pub fn new(sample_rate: u32, channels: Vec<Vec<Sample>>) -> BufferResult<Self> {
        if sample_rate == 0 {
            return Err(BufferError::InvalidSampleRate(sample_rate));
        }
        let expected = channels.first().ok_or(BufferError::NoChannels)?.len();
        if let Some((channel, found)) = channels
            .iter()
            .map(Vec::len)
            .enumerate()
            .find(|&(_, len)| len != expected)
        {
            return Err(BufferError::ChannelLengthMismatch {
                channel,
                expected,
                found,
            });
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// Create a buffer of silence
    pub fn silence(sample_rate: u32, channel_count: usize, frames: usize) -> BufferResult<Self> {
        if channel_count == 0 {
            return Err(BufferError::NoChannels);
        }
        Self::new(sample_rate, vec![vec![0.0; frames]; channel_count])
    }

    /// Create a single-channel buffer
    pub fn mono(sample_rate: u32, samples: Vec<Sample>) -> BufferResult<Self> {
        Self::new(sample_rate, vec![samples])
    }

    /// Create a buffer from interleaved samples [c0, c1, ..., c0, c1, ...]
    pub fn from_interleaved(
        sample_rate: u32,
        channel_count: usize,
        interleaved: &[Sample],
    ) -> BufferResult<Self> {
        if channel_count == 0 {
            return Err(BufferError::NoChannels);
        }
        if interleaved.len() % channel_count != 0 {
            return Err(BufferError::InterleavedLength {
                len: interleaved.len(),
                channels: channel_count,
            });
        }
        let frames = interleaved.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in interleaved.chunks_exact(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    /// Build a sibling buffer at the same sample rate from new channel data
    pub fn with_channels(&self, channels: Vec<Vec<Sample>>) -> BufferResult<Self> {
        Self::new(self.sample_rate, channels)
    }

    /// Sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels (always >= 1)
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel)
    #[inline]
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Samples of one channel
    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        &self.channels[index]
    }

    /// All channels
    #[inline]
    pub fn channels(&self) -> &[Vec<Sample>] {
        &self.channels
    }

    /// Consume the buffer and return its channel vectors
    pub fn into_channels(self) -> Vec<Vec<Sample>> {
        self.channels
    }

    /// Interleave all channels into a new vector
    pub fn to_interleaved(&self) -> Vec<Sample> {
        let channel_count = self.channel_count();
        let mut out = Vec::with_capacity(self.len() * channel_count);
        for frame in 0..self.len() {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }

    /// Average all channels into one mono signal
    pub fn mono_mix(&self) -> Vec<Sample> {
        if self.channel_count() == 1 {
            return self.channels[0].clone();
        }
        let scale = 1.0 / self.channel_count() as Sample;
        (0..self.len())
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<Sample>() * scale)
            .collect()
    }

    /// Peak absolute sample value across all channels
    pub fn peak(&self) -> Sample {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0, |acc, s| acc.max(s.abs()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Trim windows
// ═══════════════════════════════════════════════════════════════════════════════

/// Fractional trim window over a buffer's duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    start: f64,
    end: f64,
}

impl Region {
    /// The whole buffer
    pub const FULL: Region = Region { start: 0.0, end: 1.0 };

    /// Create a region, requiring `0 <= start < end <= 1`
    pub fn new(start: f64, end: f64) -> BufferResult<Self> {
        let valid = start.is_finite()
            && end.is_finite()
            && (0.0..=1.0).contains(&start)
            && (0.0..=1.0).contains(&end)
            && start < end;
        if !valid {
            return Err(BufferError::InvalidRegion { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    /// Resolve to a frame range over `len` frames, truncating both edges
    pub fn frame_range(&self, len: usize) -> Range<usize> {
        let start = (self.start * len as f64).floor() as usize;
        let end = (self.end * len as f64).floor() as usize;
        start.min(len)..end.min(len)
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::FULL
    }
}

/// A region of a sample with optional explicit frames and key assignment
///
/// Linking adjacent chops is a UI policy; the engine only consumes the
/// resolved frame range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chop {
    pub region: Region,
    /// Explicit start/end frames; take precedence over `region` when present
    pub frames: Option<(usize, usize)>,
    /// MIDI-like key (0-127)
    pub key: Option<u8>,
}

impl Chop {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            frames: None,
            key: None,
        }
    }

    /// Attach an explicit frame pair (`start < end`)
    pub fn with_frames(mut self, start: usize, end: usize) -> BufferResult<Self> {
        if start >= end {
            return Err(BufferError::InvalidFrameRange { start, end });
        }
        self.frames = Some((start, end));
        Ok(self)
    }

    /// Assign a key
    pub fn with_key(mut self, key: u8) -> BufferResult<Self> {
        if key > MAX_CHOP_KEY {
            return Err(BufferError::InvalidKey(key));
        }
        self.key = Some(key);
        Ok(self)
    }

    /// Resolve the chop to frames of a buffer with `len` frames
    pub fn frame_range(&self, len: usize) -> Range<usize> {
        match self.frames {
            Some((start, end)) => start.min(len)..end.min(len),
            None => self.region.frame_range(len),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Real-time scratch buffers
// ═══════════════════════════════════════════════════════════════════════════════

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right].
/// This enables zero-copy conversion between `&[StereoSample]` and `&[f32]`
/// (interleaved format) using bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value in both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

/// Pre-allocated stereo buffer used inside the output callback
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Never grows past the existing capacity. Newly exposed frames are silent.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        let new_len = new_len.min(self.samples.capacity());
        if new_len > self.samples.len() {
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy view of samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_validation() {
        assert_eq!(
            AudioBuffer::new(0, vec![vec![0.0]]),
            Err(BufferError::InvalidSampleRate(0))
        );
        assert_eq!(AudioBuffer::new(44100, vec![]), Err(BufferError::NoChannels));
        assert!(matches!(
            AudioBuffer::new(44100, vec![vec![0.0; 4], vec![0.0; 3]]),
            Err(BufferError::ChannelLengthMismatch { channel: 1, expected: 4, found: 3 })
        ));
        let buffer = AudioBuffer::silence(44100, 2, 100).unwrap();
        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.channel_count(), 2);
    }

    #[test]
    fn test_interleave_roundtrip() {
        let buffer = AudioBuffer::from_interleaved(48000, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(buffer.channel(0), &[1.0, 3.0, 5.0]);
        assert_eq!(buffer.channel(1), &[2.0, 4.0, 6.0]);
        assert_eq!(buffer.to_interleaved(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        assert!(matches!(
            AudioBuffer::from_interleaved(48000, 2, &[1.0, 2.0, 3.0]),
            Err(BufferError::InterleavedLength { len: 3, channels: 2 })
        ));
    }

    #[test]
    fn test_mono_mix_and_peak() {
        let buffer = AudioBuffer::new(48000, vec![vec![1.0, -0.5], vec![0.0, -0.5]]).unwrap();
        assert_eq!(buffer.mono_mix(), vec![0.5, -0.5]);
        assert_eq!(buffer.peak(), 1.0);
    }

    #[test]
    fn test_region_validation_and_frames() {
        assert!(Region::new(0.5, 0.5).is_err());
        assert!(Region::new(-0.1, 0.5).is_err());
        assert!(Region::new(0.2, 1.1).is_err());
        assert!(Region::new(f64::NAN, 1.0).is_err());

        let region = Region::new(0.25, 0.75).unwrap();
        assert_eq!(region.frame_range(10), 2..7);
        assert_eq!(Region::FULL.frame_range(10), 0..10);
    }

    #[test]
    fn test_chop_frames_take_precedence() {
        let chop = Chop::new(Region::FULL).with_frames(3, 8).unwrap().with_key(60).unwrap();
        assert_eq!(chop.frame_range(100), 3..8);
        assert_eq!(chop.frame_range(5), 3..5);
        assert_eq!(chop.key, Some(60));
        assert!(Chop::new(Region::FULL).with_key(128).is_err());
        assert!(Chop::new(Region::FULL).with_frames(5, 5).is_err());
    }

    #[test]
    fn test_stereo_buffer_interleaved_view() {
        let mut buffer = StereoBuffer::silence(4);
        buffer[1] = StereoSample::new(0.5, -0.25);
        assert_eq!(buffer.as_interleaved()[2..4], [0.5, -0.25]);
        assert_eq!(buffer.peak(), 0.5);

        buffer.set_len_from_capacity(2);
        assert_eq!(buffer.len(), 2);
        // Growing is bounded by the original allocation
        buffer.set_len_from_capacity(64);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer[3], StereoSample::silence());
    }
}
