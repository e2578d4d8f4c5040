//! Codec error types

use thiserror::Error;

use crate::types::BufferError;

/// Errors that can occur while encoding or decoding audio
#[derive(Error, Debug)]
pub enum CodecError {
    /// RIFF/WAVE structure is missing or malformed
    #[error("Invalid WAV data: {0}")]
    Format(String),

    /// fmt chunk describes a sample layout we cannot decode
    #[error("Unsupported WAV sample format: tag {format_tag}, {bits_per_sample} bits")]
    UnsupportedFormat { format_tag: u16, bits_per_sample: u16 },

    /// Sample data does not fit a 32-bit RIFF size field
    #[error("Audio too large for a RIFF/WAVE container ({0} bytes of sample data)")]
    TooLarge(u64),

    #[error("Cannot encode an empty buffer")]
    EmptyBuffer,

    /// Encoder could not be created or configured
    #[error("MP3 encoder error: {0}")]
    Mp3Encoder(String),

    /// Every frame was rejected by the encoder
    #[error("MP3 encoding produced no frames ({failed} frames rejected)")]
    Mp3NoFrames { failed: usize },

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;
