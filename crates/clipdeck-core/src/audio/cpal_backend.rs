//! CPAL audio backend implementation
//!
//! Runs one capture stream and one monitor stream, each owning its half of
//! the real-time graph:
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Control Thread  │───push()───────────►│   Command Queue     │
//! │  (GraphHandle)   │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!     ▲         ▲                                     │ pop()
//!     │ chunks  │ Relaxed atomics                     ▼
//!     │         │                          ┌─────────────────────┐
//!     │         └──────────────────────────│ CPAL Output Thread  │
//!     │                                    │ (owns OutputGraph)  │
//!     │                                    └─────────────────────┘
//!     │                                    ┌─────────────────────┐
//!     └────────────────────────────────────│  CPAL Input Thread  │
//!                                          │  (owns InputGraph)  │
//!                                          └─────────────────────┘
//! ```
//!
//! Neither callback takes a lock; the graph halves are moved into them.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig, SupportedStreamConfig,
    SupportedStreamConfigRange,
};

use super::config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, LOW_LATENCY_BUFFER_SIZES, MAX_BUFFER_SIZE};
use super::device::{resolve_device, Direction};
use super::error::{AudioError, AudioResult};
use crate::graph::{self, GraphHandle, InputGraph, OutputGraph};
use crate::params::{EqSettings, GateSettings};
use crate::types::StereoBuffer;

/// Keeps both streams alive. Drop this to stop audio.
pub struct CpalAudioHandle {
    _input_stream: Stream,
    _output_stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl CpalAudioHandle {
    /// Get the sample rate of the audio system
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the requested buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Get the audio latency in milliseconds (one-way, output only)
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// A running audio system
pub struct AudioSystem {
    /// Stream owner; dropping it stops audio
    pub handle: CpalAudioHandle,
    /// Control side of the graph hosted by the streams
    pub graph: GraphHandle,
    pub sample_rate: u32,
    /// Channels delivered by the capture stream
    pub input_channels: usize,
    /// Requested buffer size in frames
    pub buffer_size: u32,
    /// Audio latency in milliseconds (one-way, output only)
    pub latency_ms: f32,
}

/// Open the capture and monitor devices, build the graph and start both streams
///
/// Both streams run at the same sample rate; the output picks the rate first
/// and the input has to support it.
pub fn start_audio_system(
    config: &AudioConfig,
    eq: &EqSettings,
    gate: &GateSettings,
) -> AudioResult<AudioSystem> {
    let output_device = resolve_device(config.output_device.as_ref(), Direction::Output)?;
    let input_device = resolve_device(config.input_device.as_ref(), Direction::Input)?;

    log::info!(
        "Using audio devices: input '{}', output '{}'",
        input_device.name().unwrap_or_else(|_| "Unknown".to_string()),
        output_device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let output_ranges: Vec<_> = output_device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();
    let output_supported = select_config(&output_ranges, config.sample_rate, Direction::Output)?;
    let sample_rate = output_supported.sample_rate().0;

    let input_ranges: Vec<_> = input_device
        .supported_input_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();
    let input_supported = select_config(&input_ranges, sample_rate, Direction::Input)?;
    if input_supported.sample_rate().0 != sample_rate {
        return Err(AudioError::SampleRateMismatch {
            input: input_supported.sample_rate().0,
            output: sample_rate,
        });
    }

    let buffer_size = select_buffer_size(config.buffer_size);
    let output_config = StreamConfig {
        channels: output_supported.channels(),
        sample_rate: output_supported.sample_rate(),
        buffer_size: buffer_size_to_cpal(config.buffer_size, buffer_size),
    };
    let input_config = StreamConfig {
        channels: input_supported.channels(),
        sample_rate: input_supported.sample_rate(),
        buffer_size: buffer_size_to_cpal(config.buffer_size, buffer_size),
    };
    let input_channels = input_config.channels as usize;
    let latency_ms = (buffer_size as f32 / sample_rate as f32) * 1000.0;

    log::info!(
        "Audio config: {}Hz, {} input channels, {} output channels, {} frames (~{:.1}ms latency)",
        sample_rate,
        input_channels,
        output_config.channels,
        buffer_size,
        latency_ms
    );

    let (input_graph, output_graph, graph) = graph::build(sample_rate, input_channels, eq, gate);

    let output_stream = build_output_stream(&output_device, &output_config, output_graph)?;
    let input_stream = build_input_stream(&input_device, &input_config, input_graph)?;

    output_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Output: {}", e)))?;
    input_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Input: {}", e)))?;

    log::info!("Audio streams started");

    Ok(AudioSystem {
        handle: CpalAudioHandle {
            _input_stream: input_stream,
            _output_stream: output_stream,
            sample_rate,
            buffer_size,
        },
        graph,
        sample_rate,
        input_channels,
        buffer_size,
        latency_ms,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration selection
// ═══════════════════════════════════════════════════════════════════════════════

fn supports_rate(range: &SupportedStreamConfigRange, rate: u32) -> bool {
    rate >= range.min_sample_rate().0 && rate <= range.max_sample_rate().0
}

/// Pick the best stream configuration for a device
///
/// Only f32 configurations are considered. Preference order: target rate
/// with a friendly channel count (stereo out, mono/stereo in), target rate
/// with any channel count, friendly channel count at the closest rate, then
/// anything.
fn select_config(
    ranges: &[SupportedStreamConfigRange],
    target_rate: u32,
    direction: Direction,
) -> AudioResult<SupportedStreamConfig> {
    let float: Vec<&SupportedStreamConfigRange> = ranges
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();
    if float.is_empty() {
        return Err(if ranges.is_empty() {
            AudioError::ConfigError(format!("No supported {} configurations", direction.label()))
        } else {
            AudioError::UnsupportedFormat(format!(
                "{} device offers no f32 configuration",
                direction.label()
            ))
        });
    }

    let friendly = |c: &SupportedStreamConfigRange| match direction {
        Direction::Output => c.channels() >= 2,
        Direction::Input => c.channels() <= 2,
    };

    let best = float
        .iter()
        .find(|c| friendly(**c) && supports_rate(**c, target_rate))
        .or_else(|| float.iter().find(|c| supports_rate(**c, target_rate)))
        .or_else(|| float.iter().find(|c| friendly(**c)))
        .or_else(|| float.first())
        .ok_or_else(|| {
            AudioError::ConfigError(format!("No suitable {} configuration found", direction.label()))
        })?;

    let sample_rate = if supports_rate(best, target_rate) {
        target_rate
    } else {
        // Closest end of the supported range
        let fallback = target_rate.clamp(best.min_sample_rate().0, best.max_sample_rate().0);
        log::warn!(
            "Audio {} device doesn't support {}Hz, falling back to {}Hz",
            direction.label(),
            target_rate,
            fallback
        );
        fallback
    };

    Ok((*best).clone().with_sample_rate(cpal::SampleRate(sample_rate)))
}

/// Buffer size in frames for the configured preference
fn select_buffer_size(preference: BufferSize) -> u32 {
    let frames = match preference {
        BufferSize::Default => DEFAULT_BUFFER_SIZE,
        BufferSize::Fixed(frames) => frames.clamp(LOW_LATENCY_BUFFER_SIZES[0], MAX_BUFFER_SIZE as u32),
        // A safe but responsive size; probing for xruns at runtime isn't done
        BufferSize::LowLatency => LOW_LATENCY_BUFFER_SIZES[2],
    };
    log::debug!("Selected buffer size: {} frames for {:?} mode", frames, preference);
    frames
}

fn buffer_size_to_cpal(preference: BufferSize, frames: u32) -> CpalBufferSize {
    match preference {
        BufferSize::Default => CpalBufferSize::Default,
        _ => CpalBufferSize::Fixed(frames),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Streams
// ═══════════════════════════════════════════════════════════════════════════════

/// Build the capture stream; the input graph moves into the callback
fn build_input_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut input: InputGraph,
) -> AudioResult<Stream> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                input.process(data);
            },
            move |err| {
                log::error!("Input audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

/// Build the monitor stream; the output graph moves into the callback
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut output: OutputGraph,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    let mut scratch = StereoBuffer::silence(MAX_BUFFER_SIZE);

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                render_interleaved(&mut output, &mut scratch, data, channels);
            },
            move |err| {
                log::error!("Output audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

/// Render the graph into an interleaved device buffer of any channel count
///
/// Processes in slices of the scratch capacity so oversized device buffers
/// never force an allocation. Channels past the first two are silent.
fn render_interleaved(output: &mut OutputGraph, scratch: &mut StereoBuffer, data: &mut [f32], channels: usize) {
    if channels == 0 {
        return;
    }
    for block in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
        let frames = block.len() / channels;
        scratch.set_len_from_capacity(frames);
        output.process(scratch);

        for (frame, sample) in block.chunks_mut(channels).zip(scratch.as_slice()) {
            frame[0] = if channels > 1 { sample.left } else { 0.5 * (sample.left + sample.right) };
            if channels > 1 {
                frame[1] = sample.right;
            }
            for ch in frame.iter_mut().skip(2) {
                *ch = 0.0;
            }
        }
    }
}
