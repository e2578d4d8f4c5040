//! RIFF/WAVE encoding and decoding
//!
//! Encoding always writes the canonical 44-byte header (`RIFF`, `fmt `, `data`)
//! followed by little-endian interleaved samples:
//!
//! | Depth | Tag | Layout |
//! |-------|-----|--------|
//! | 16    | 1   | i16, negative * 32768, positive * 32767 |
//! | 24    | 1   | packed 3-byte i24, negative * 8388608, positive * 8388607 |
//! | 32    | 3   | f32, written unmodified |
//!
//! Decoding walks the chunk list, so files with `LIST`/`bext`/`cue ` chunks
//! before or after `data` are accepted, as are WAVE_FORMAT_EXTENSIBLE headers.

use crate::params::BitDepth;
use crate::types::{AudioBuffer, Sample};

use super::error::{CodecError, CodecResult};

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Size of the header written by [`encode_wav`]
pub const WAV_HEADER_LEN: usize = 44;

const SCALE_16_NEG: f64 = 32768.0;
const SCALE_16_POS: f64 = 32767.0;
const SCALE_24_NEG: f64 = 8388608.0;
const SCALE_24_POS: f64 = 8388607.0;

/// Audio format information from the fmt chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    /// Resolved format tag (1 = PCM, 3 = IEEE float), extensible headers unwrapped
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Bytes per sample frame as declared by the file
    pub block_align: u16,
}

impl WavFormat {
    fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Frame stride used for decoding
    fn frame_bytes(&self) -> usize {
        let packed = self.bytes_per_sample() * self.channels as usize;
        packed.max(self.block_align as usize)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Encoding
// ═══════════════════════════════════════════════════════════════════════════════

/// Quantize one sample to a signed integer with asymmetric scaling
#[inline]
fn quantize(sample: Sample, neg_scale: f64, pos_scale: f64) -> i32 {
    if sample.is_nan() {
        return 0;
    }
    let s = (sample as f64).clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * neg_scale) as i32
    } else {
        (s * pos_scale) as i32
    }
}

#[inline]
fn dequantize(value: i32, neg_scale: f64, pos_scale: f64) -> Sample {
    let scale = if value < 0 { neg_scale } else { pos_scale };
    (value as f64 / scale) as Sample
}

/// Convert one sample to 16-bit PCM the same way the WAV encoder does
#[inline]
pub fn sample_to_i16(sample: Sample) -> i16 {
    quantize(sample, SCALE_16_NEG, SCALE_16_POS) as i16
}

/// Encode a buffer as a RIFF/WAVE byte vector
///
/// An empty buffer produces a valid header with an empty `data` chunk.
pub fn encode_wav(buffer: &AudioBuffer, depth: BitDepth) -> CodecResult<Vec<u8>> {
    let channels = buffer.channel_count();
    let bytes_per_sample = depth.bytes_per_sample();
    let data_len = (buffer.len() as u64) * (channels as u64) * (bytes_per_sample as u64);

    if channels > u16::MAX as usize || data_len > (u32::MAX as u64 - 36) {
        return Err(CodecError::TooLarge(data_len));
    }

    let block_align = (channels * bytes_per_sample) as u16;
    let byte_rate = buffer.sample_rate() * block_align as u32;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&depth.format_tag().to_le_bytes());
    out.extend_from_slice(&(channels as u16).to_le_bytes());
    out.extend_from_slice(&buffer.sample_rate().to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&depth.bits().to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data_len as u32).to_le_bytes());

    for frame in 0..buffer.len() {
        for channel in buffer.channels() {
            let sample = channel[frame];
            match depth {
                BitDepth::Sixteen => {
                    out.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
                }
                BitDepth::TwentyFour => {
                    let v = quantize(sample, SCALE_24_NEG, SCALE_24_POS);
                    out.extend_from_slice(&v.to_le_bytes()[0..3]);
                }
                BitDepth::ThirtyTwoFloat => {
                    out.extend_from_slice(&sample.to_le_bytes());
                }
            }
        }
    }

    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decoding
// ═══════════════════════════════════════════════════════════════════════════════

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Parse the fmt chunk body
fn parse_fmt_chunk(body: &[u8]) -> CodecResult<WavFormat> {
    if body.len() < 16 {
        return Err(CodecError::Format("fmt chunk too small".into()));
    }

    let mut format_tag = read_u16(body, 0);
    let channels = read_u16(body, 2);
    let sample_rate = read_u32(body, 4);
    let block_align = read_u16(body, 12);
    let bits_per_sample = read_u16(body, 14);

    // WAVE_FORMAT_EXTENSIBLE: the real tag is the first two bytes of the sub-format GUID
    if format_tag == FORMAT_EXTENSIBLE {
        if body.len() < 40 {
            return Err(CodecError::Format("extensible fmt chunk too small".into()));
        }
        format_tag = read_u16(body, 24);
    }

    if channels == 0 {
        return Err(CodecError::Format("fmt chunk declares zero channels".into()));
    }
    if sample_rate == 0 {
        return Err(CodecError::Format("fmt chunk declares a zero sample rate".into()));
    }

    Ok(WavFormat {
        format_tag,
        channels,
        sample_rate,
        bits_per_sample,
        block_align,
    })
}

/// Locate the fmt and data chunks
fn parse_chunks(bytes: &[u8]) -> CodecResult<(WavFormat, &[u8])> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" {
        return Err(CodecError::Format("not a RIFF file".into()));
    }
    if &bytes[8..12] != b"WAVE" {
        return Err(CodecError::Format("not a WAVE file".into()));
    }

    let mut format: Option<WavFormat> = None;
    let mut data: Option<&[u8]> = None;
    let mut pos = 12;

    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_size = read_u32(bytes, pos + 4) as usize;
        let body_start = pos + 8;
        // Truncated files and streaming writers (size 0xFFFFFFFF) are clipped to what exists
        let body_end = body_start.saturating_add(chunk_size).min(bytes.len());
        let body = &bytes[body_start..body_end];

        match chunk_id {
            b"fmt " => format = Some(parse_fmt_chunk(body)?),
            b"data" => data = Some(body),
            _ => {
                log::debug!(
                    "decode_wav: skipping chunk {:?} ({} bytes)",
                    String::from_utf8_lossy(chunk_id),
                    chunk_size
                );
            }
        }

        // Pad to word boundary
        pos = body_end + (chunk_size % 2);
        if data.is_some() && format.is_some() {
            break;
        }
    }

    let format = format.ok_or_else(|| CodecError::Format("missing fmt chunk".into()))?;
    let data = data.ok_or_else(|| CodecError::Format("missing data chunk".into()))?;
    Ok((format, data))
}

/// Read only the format of a WAV byte stream
pub fn probe_wav(bytes: &[u8]) -> CodecResult<WavFormat> {
    parse_chunks(bytes).map(|(format, _)| format)
}

/// Decode a RIFF/WAVE byte stream into a planar buffer
pub fn decode_wav(bytes: &[u8]) -> CodecResult<AudioBuffer> {
    let (format, data) = parse_chunks(bytes)?;

    let decode: fn(&[u8]) -> Sample = match (format.format_tag, format.bits_per_sample) {
        (FORMAT_PCM, 8) => |b: &[u8]| (b[0] as f32 - 128.0) / 128.0,
        (FORMAT_PCM, 16) => |b: &[u8]| {
            dequantize(i16::from_le_bytes([b[0], b[1]]) as i32, SCALE_16_NEG, SCALE_16_POS)
        },
        (FORMAT_PCM, 24) => |b: &[u8]| {
            // Sign-extend by placing the 3 bytes in the top of an i32
            let v = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
            dequantize(v, SCALE_24_NEG, SCALE_24_POS)
        },
        (FORMAT_PCM, 32) => |b: &[u8]| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2147483648.0,
        (FORMAT_IEEE_FLOAT, 32) => |b: &[u8]| f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        (FORMAT_IEEE_FLOAT, 64) => |b: &[u8]| {
            f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
        },
        (format_tag, bits_per_sample) => {
            return Err(CodecError::UnsupportedFormat {
                format_tag,
                bits_per_sample,
            })
        }
    };

    let channel_count = format.channels as usize;
    let sample_bytes = format.bytes_per_sample();
    let frame_bytes = format.frame_bytes();
    let frames = data.len() / frame_bytes;

    if data.len() % frame_bytes != 0 {
        log::warn!(
            "decode_wav: data chunk has {} trailing bytes, ignoring partial frame",
            data.len() % frame_bytes
        );
    }

    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for frame in data.chunks_exact(frame_bytes) {
        for (ch, channel) in channels.iter_mut().enumerate() {
            let offset = ch * sample_bytes;
            channel.push(decode(&frame[offset..offset + sample_bytes]));
        }
    }

    Ok(AudioBuffer::new(format.sample_rate, channels)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_buffer() -> AudioBuffer {
        let left: Vec<f32> = (0..1000).map(|i| ((i as f32) * 0.05).sin() * 0.9).collect();
        let right: Vec<f32> = (0..1000).map(|i| ((i as f32) * 0.031).cos() * 0.5).collect();
        AudioBuffer::new(44100, vec![left, right]).unwrap()
    }

    fn max_error(a: &AudioBuffer, b: &AudioBuffer) -> f32 {
        a.channels()
            .iter()
            .zip(b.channels())
            .flat_map(|(x, y)| x.iter().zip(y).map(|(p, q)| (p - q).abs()))
            .fold(0.0, f32::max)
    }

    #[test]
    fn test_roundtrip_all_depths() {
        let buffer = test_buffer();
        for (depth, step) in [
            (BitDepth::Sixteen, 1.0 / 32767.0),
            (BitDepth::TwentyFour, 1.0 / 8388607.0),
            (BitDepth::ThirtyTwoFloat, 0.0),
        ] {
            let bytes = encode_wav(&buffer, depth).unwrap();
            assert_eq!(bytes.len(), WAV_HEADER_LEN + 1000 * 2 * depth.bytes_per_sample());

            let decoded = decode_wav(&bytes).unwrap();
            assert_eq!(decoded.len(), buffer.len());
            assert_eq!(decoded.channel_count(), 2);
            assert_eq!(decoded.sample_rate(), 44100);
            assert!(
                max_error(&buffer, &decoded) <= step + f32::EPSILON,
                "{:?} error too large",
                depth
            );
        }
    }

    #[test]
    fn test_header_layout() {
        let buffer = AudioBuffer::mono(48000, vec![0.0; 4]).unwrap();
        let bytes = encode_wav(&buffer, BitDepth::ThirtyTwoFloat).unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(read_u32(&bytes, 4), 36 + 16);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(read_u16(&bytes, 20), 3);
        assert_eq!(read_u16(&bytes, 22), 1);
        assert_eq!(read_u32(&bytes, 24), 48000);
        assert_eq!(read_u32(&bytes, 28), 48000 * 4);
        assert_eq!(read_u16(&bytes, 32), 4);
        assert_eq!(read_u16(&bytes, 34), 32);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(read_u32(&bytes, 40), 16);
    }

    #[test]
    fn test_extreme_values_and_clamping() {
        let buffer = AudioBuffer::mono(8000, vec![-1.0, 1.0, -2.0, 2.0, f32::NAN]).unwrap();
        let bytes = encode_wav(&buffer, BitDepth::Sixteen).unwrap();
        let samples: Vec<i16> = bytes[WAV_HEADER_LEN..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![-32768, 32767, -32768, 32767, 0]);

        let bytes = encode_wav(&buffer, BitDepth::TwentyFour).unwrap();
        let decoded = decode_wav(&bytes).unwrap();
        assert_eq!(decoded.channel(0)[0], -1.0);
        assert_eq!(decoded.channel(0)[1], 1.0);
    }

    #[test]
    fn test_empty_buffer_encodes_header_only() {
        let buffer = AudioBuffer::silence(44100, 2, 0).unwrap();
        let bytes = encode_wav(&buffer, BitDepth::Sixteen).unwrap();
        assert_eq!(bytes.len(), WAV_HEADER_LEN);
        let decoded = decode_wav(&bytes).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.channel_count(), 2);
    }

    #[test]
    fn test_missing_magic_is_format_error() {
        assert!(matches!(decode_wav(b"not a wav file at all"), Err(CodecError::Format(_))));

        let mut bytes = encode_wav(&test_buffer(), BitDepth::Sixteen).unwrap();
        bytes[8..12].copy_from_slice(b"AVI ");
        assert!(matches!(decode_wav(&bytes), Err(CodecError::Format(_))));

        let mut bytes = encode_wav(&test_buffer(), BitDepth::Sixteen).unwrap();
        bytes[12..16].copy_from_slice(b"junk");
        assert!(matches!(decode_wav(&bytes), Err(CodecError::Format(_))));
    }

    #[test]
    fn test_skips_unknown_chunks_with_padding() {
        let buffer = test_buffer();
        let encoded = encode_wav(&buffer, BitDepth::Sixteen).unwrap();

        // Insert an odd-sized LIST chunk (plus pad byte) between fmt and data
        let mut bytes = encoded[..36].to_vec();
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 0]);
        bytes.extend_from_slice(&encoded[36..]);

        let decoded = decode_wav(&bytes).unwrap();
        assert_eq!(decoded.len(), buffer.len());
        assert!(max_error(&buffer, &decoded) <= 1.0 / 32767.0 + f32::EPSILON);
    }

    #[test]
    fn test_interop_with_hound() {
        let buffer = test_buffer();
        let bytes = encode_wav(&buffer, BitDepth::TwentyFour).unwrap();

        let reader = hound::WavReader::new(std::io::Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.bits_per_sample, 24);
        assert_eq!(reader.len(), 2000);

        // Files written by another encoder decode too
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: 22050,
                bits_per_sample: 32,
                sample_format: hound::SampleFormat::Float,
            };
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [0.25f32, -0.5, 0.75] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        let decoded = decode_wav(cursor.get_ref()).unwrap();
        assert_eq!(decoded.sample_rate(), 22050);
        assert_eq!(decoded.channel(0), &[0.25, -0.5, 0.75]);
    }

    #[test]
    fn test_unsupported_format() {
        let mut bytes = encode_wav(&test_buffer(), BitDepth::Sixteen).unwrap();
        // Claim A-law (tag 6)
        bytes[20..22].copy_from_slice(&6u16.to_le_bytes());
        assert!(matches!(
            decode_wav(&bytes),
            Err(CodecError::UnsupportedFormat { format_tag: 6, bits_per_sample: 16 })
        ));
    }
}
