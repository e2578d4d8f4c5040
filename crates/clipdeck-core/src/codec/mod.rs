//! PCM codecs
//!
//! - [`wav`]: canonical RIFF/WAVE encode and a tolerant chunk-walking decoder
//! - [`mp3`]: CBR MP3 export through LAME, frame by frame
//!
//! All functions take an [`AudioBuffer`] by reference and never modify it.

mod error;
pub mod mp3;
pub mod wav;

pub use error::{CodecError, CodecResult};
pub use mp3::{encode_mp3, encode_mp3_with, LameFrameEncoder, Mp3FrameEncoder, MP3_FRAME_SAMPLES};
pub use wav::{decode_wav, encode_wav, WavFormat};

use crate::params::{BitDepth, Mp3Bitrate};
use crate::types::AudioBuffer;

/// Container/format for exported audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Wav(BitDepth),
    Mp3(Mp3Bitrate),
}

impl ExportFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Wav(_) => "wav",
            ExportFormat::Mp3(_) => "mp3",
        }
    }
}

/// Encode a buffer for export
///
/// MP3 failures surface as errors; there is no silent fallback to WAV.
pub fn encode_export(buffer: &AudioBuffer, format: ExportFormat) -> CodecResult<Vec<u8>> {
    match format {
        ExportFormat::Wav(depth) => encode_wav(buffer, depth),
        ExportFormat::Mp3(bitrate) => encode_mp3(buffer, bitrate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_dispatch() {
        let buffer = AudioBuffer::mono(44100, vec![0.0; 10]).unwrap();
        let wav = encode_export(&buffer, ExportFormat::Wav(BitDepth::Sixteen)).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(ExportFormat::Mp3(Mp3Bitrate::Kbps128).extension(), "mp3");

        let empty = AudioBuffer::mono(44100, vec![]).unwrap();
        assert!(matches!(
            encode_export(&empty, ExportFormat::Mp3(Mp3Bitrate::Kbps128)),
            Err(CodecError::EmptyBuffer)
        ));
    }
}
