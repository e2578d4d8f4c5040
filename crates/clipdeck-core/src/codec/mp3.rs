//! MP3 export via LAME
//!
//! The buffer is converted to 16-bit PCM with the WAV quantizer and fed to the
//! encoder in frames of [`MP3_FRAME_SAMPLES`]. A frame the encoder rejects is
//! logged and skipped; the whole encode only fails when no frame got through.
//!
//! The per-frame encoder sits behind [`Mp3FrameEncoder`] so the frame loop can
//! be driven by something other than LAME.

use std::mem::MaybeUninit;

use mp3lame_encoder::{Builder, DualPcm, FlushNoGap, MonoPcm};

use crate::params::Mp3Bitrate;
use crate::types::AudioBuffer;

use super::error::{CodecError, CodecResult};
use super::wav::sample_to_i16;

/// Samples per channel in one MPEG-1 Layer III frame
pub const MP3_FRAME_SAMPLES: usize = 1152;

/// Encoder that consumes one frame of 16-bit PCM at a time
///
/// `right` is `None` for mono input.
pub trait Mp3FrameEncoder {
    /// Encode one frame, appending any produced bytes to `out`
    fn encode_frame(&mut self, left: &[i16], right: Option<&[i16]>, out: &mut Vec<u8>) -> Result<(), String>;

    /// Drain buffered output at the end of the stream
    fn flush(&mut self, out: &mut Vec<u8>) -> Result<(), String>;
}

/// Append into a vector's spare capacity through a writer returning the byte count
fn append_with<F>(out: &mut Vec<u8>, reserve: usize, write: F) -> Result<(), String>
where
    F: FnOnce(&mut [MaybeUninit<u8>]) -> Result<usize, String>,
{
    out.reserve(reserve);
    let written = write(out.spare_capacity_mut())?;
    // SAFETY: the encoder initialized `written` bytes of spare capacity
    unsafe {
        out.set_len(out.len() + written);
    }
    Ok(())
}

/// Native CBR encoder using LAME via the mp3lame-encoder crate
pub struct LameFrameEncoder {
    encoder: mp3lame_encoder::Encoder,
}

impl LameFrameEncoder {
    /// Create a constant bit rate encoder for mono or stereo input
    pub fn new(sample_rate: u32, channels: u8, bitrate: Mp3Bitrate) -> CodecResult<Self> {
        let mut builder = Builder::new()
            .ok_or_else(|| CodecError::Mp3Encoder("LAME encoder init failed".to_string()))?;

        builder
            .set_num_channels(channels)
            .map_err(|e| CodecError::Mp3Encoder(format!("LAME set channels failed: {:?}", e)))?;
        builder
            .set_sample_rate(sample_rate)
            .map_err(|e| CodecError::Mp3Encoder(format!("LAME set sample rate failed: {:?}", e)))?;
        builder
            .set_brate(lame_bitrate(bitrate))
            .map_err(|e| CodecError::Mp3Encoder(format!("LAME set bitrate failed: {:?}", e)))?;
        builder
            .set_quality(mp3lame_encoder::Quality::Best)
            .map_err(|e| CodecError::Mp3Encoder(format!("LAME set quality failed: {:?}", e)))?;

        let encoder = builder
            .build()
            .map_err(|e| CodecError::Mp3Encoder(format!("LAME build failed: {:?}", e)))?;

        Ok(Self { encoder })
    }
}

fn lame_bitrate(bitrate: Mp3Bitrate) -> mp3lame_encoder::Bitrate {
    match bitrate {
        Mp3Bitrate::Kbps128 => mp3lame_encoder::Bitrate::Kbps128,
        Mp3Bitrate::Kbps192 => mp3lame_encoder::Bitrate::Kbps192,
        Mp3Bitrate::Kbps256 => mp3lame_encoder::Bitrate::Kbps256,
        Mp3Bitrate::Kbps320 => mp3lame_encoder::Bitrate::Kbps320,
    }
}

impl Mp3FrameEncoder for LameFrameEncoder {
    fn encode_frame(&mut self, left: &[i16], right: Option<&[i16]>, out: &mut Vec<u8>) -> Result<(), String> {
        let reserve = mp3lame_encoder::max_required_buffer_size(left.len());
        let encoder = &mut self.encoder;
        append_with(out, reserve, |spare| match right {
            Some(right) => encoder
                .encode(DualPcm { left, right }, spare)
                .map_err(|e| format!("{:?}", e)),
            None => encoder
                .encode(MonoPcm(left), spare)
                .map_err(|e| format!("{:?}", e)),
        })
    }

    fn flush(&mut self, out: &mut Vec<u8>) -> Result<(), String> {
        let encoder = &mut self.encoder;
        append_with(out, 7200, |spare| {
            encoder
                .flush::<FlushNoGap>(spare)
                .map_err(|e| format!("{:?}", e))
        })
    }
}

/// Encode a buffer as a CBR MP3 stream
///
/// Buffers with more than two channels are reduced to their first two.
pub fn encode_mp3(buffer: &AudioBuffer, bitrate: Mp3Bitrate) -> CodecResult<Vec<u8>> {
    if buffer.is_empty() {
        return Err(CodecError::EmptyBuffer);
    }
    let channels = buffer.channel_count().min(2) as u8;
    let mut encoder = LameFrameEncoder::new(buffer.sample_rate(), channels, bitrate)?;
    encode_mp3_with(buffer, &mut encoder)
}

/// Run the frame loop with any [`Mp3FrameEncoder`]
pub fn encode_mp3_with<E: Mp3FrameEncoder>(buffer: &AudioBuffer, encoder: &mut E) -> CodecResult<Vec<u8>> {
    if buffer.is_empty() {
        return Err(CodecError::EmptyBuffer);
    }

    let to_pcm = |channel: &[f32]| -> Vec<i16> { channel.iter().map(|&s| sample_to_i16(s)).collect() };
    let left = to_pcm(buffer.channel(0));
    let right = (buffer.channel_count() > 1).then(|| to_pcm(buffer.channel(1)));

    let frame_count = buffer.len().div_ceil(MP3_FRAME_SAMPLES);
    let mut out = Vec::new();
    let mut encoded = 0usize;
    let mut failed = 0usize;

    for frame in 0..frame_count {
        let start = frame * MP3_FRAME_SAMPLES;
        let end = (start + MP3_FRAME_SAMPLES).min(buffer.len());
        let right_frame = right.as_ref().map(|r| &r[start..end]);

        match encoder.encode_frame(&left[start..end], right_frame, &mut out) {
            Ok(()) => encoded += 1,
            Err(e) => {
                failed += 1;
                log::warn!("encode_mp3: frame {} of {} rejected: {}", frame, frame_count, e);
            }
        }
    }

    if encoded == 0 {
        return Err(CodecError::Mp3NoFrames { failed });
    }

    if let Err(e) = encoder.flush(&mut out) {
        log::warn!("encode_mp3: flush failed, stream may be missing its tail: {}", e);
    }

    log::debug!(
        "encode_mp3: {} frames encoded, {} skipped, {} bytes",
        encoded,
        failed,
        out.len()
    );
    Ok(out)
}
