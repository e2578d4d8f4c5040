//! Real-time capture and playback graph
//!
//! One graph exists per session. [`build`] splits it into three owners:
//!
//! ```text
//! ┌─────────────────┐  meters + recorder chunks   ┌──────────────────┐
//! │   InputGraph    │────────────────────────────►│                  │
//! │ (input stream)  │                             │   GraphHandle    │
//! └─────────────────┘                             │ (control thread) │
//! ┌─────────────────┐  GraphCommand (rtrb)        │                  │
//! │   OutputGraph   │◄────────────────────────────│                  │
//! │ (output stream) │────────────────────────────►│                  │
//! └─────────────────┘  meters, voice count, mute  └──────────────────┘
//! ```
//!
//! The two stream halves never lock, allocate or free. The handle is owned by
//! the engine controller, which is the only thing allowed to change the graph.

mod chain;
mod command;
mod error;
mod meter;
mod recorder;
mod voice;

pub use chain::{ProcessingChain, StageKind, SIGNAL_PATH};
pub use command::{command_channel, CommandSender, GraphCommand, COMMAND_QUEUE_CAPACITY};
pub use error::{GraphError, GraphResult};
pub use meter::{ChannelMeter, MeterAtomics};
pub use recorder::{recorder, RecordedTake, RecorderSink, RecorderTap, CHUNK_FRAMES};
pub use voice::{PlayRequest, VoiceId, VoicePool, MAX_VOICES};

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use basedrop::Shared;

use crate::dsp::SmoothedParam;
use crate::engine::gc::gc_handle;
use crate::params::{EqSettings, GateSettings};
use crate::types::{AudioBuffer, Sample, StereoBuffer};

/// Ramp used when muting or un-muting the output
pub const MUTE_RAMP_SECONDS: f32 = 0.010;

/// State published by the stream callbacks (lock-free reads)
#[derive(Debug)]
pub struct GraphShared {
    pub meters: MeterAtomics,
    muted: AtomicBool,
    active_voices: AtomicUsize,
    rejected_voices: AtomicU64,
}

impl GraphShared {
    fn new(input_channels: usize) -> Self {
        Self {
            meters: MeterAtomics::new(input_channels),
            muted: AtomicBool::new(false),
            active_voices: AtomicUsize::new(0),
            rejected_voices: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn active_voices(&self) -> usize {
        self.active_voices.load(Ordering::Relaxed)
    }

    /// Play requests dropped because every voice was busy
    #[inline]
    pub fn rejected_voices(&self) -> u64 {
        self.rejected_voices.load(Ordering::Relaxed)
    }
}

/// Build a graph for `input_channels` interleaved input channels and a stereo output
pub fn build(
    sample_rate: u32,
    input_channels: usize,
    eq: &EqSettings,
    gate: &GateSettings,
) -> (InputGraph, OutputGraph, GraphHandle) {
    let input_channels = input_channels.max(1);
    let shared = Arc::new(GraphShared::new(input_channels));
    let (tap, sink) = recorder(input_channels, sample_rate);
    let (command_tx, command_rx) = command_channel();

    let mute_ramp = ((sample_rate as f32 * MUTE_RAMP_SECONDS).round() as u32).max(1);

    let input = InputGraph {
        channels: input_channels,
        tap,
        shared: Arc::clone(&shared),
    };
    let output = OutputGraph {
        commands: command_rx,
        voices: VoicePool::new(sample_rate),
        chain: ProcessingChain::new(sample_rate, eq, gate, 1.0),
        mute: SmoothedParam::new(1.0, mute_ramp),
        shared: Arc::clone(&shared),
    };
    let handle = GraphHandle {
        commands: CommandSender { producer: command_tx },
        recorder: sink,
        shared,
        sample_rate,
        input_channels,
        next_voice: 1,
    };

    log::debug!(
        "graph: built at {}Hz with {} input channels",
        sample_rate,
        input_channels
    );
    (input, output, handle)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Stream halves
// ═══════════════════════════════════════════════════════════════════════════════

/// Input half: meters and the lossless recorder tap
pub struct InputGraph {
    channels: usize,
    tap: RecorderTap,
    shared: Arc<GraphShared>,
}

impl InputGraph {
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Handle one interleaved input block (audio thread)
    pub fn process(&mut self, interleaved: &[Sample]) {
        self.shared.meters.record_input(interleaved, self.channels);
        self.tap.process(interleaved);
    }
}

/// Output half: voices, processing chain and monitor mute
pub struct OutputGraph {
    commands: rtrb::Consumer<GraphCommand>,
    voices: VoicePool,
    chain: ProcessingChain,
    mute: SmoothedParam,
    shared: Arc<GraphShared>,
}

impl OutputGraph {
    /// Apply every queued command (audio thread)
    pub fn process_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                GraphCommand::Play(request) => {
                    if self.voices.start(request).is_err() {
                        self.shared.rejected_voices.fetch_add(1, Ordering::Relaxed);
                    }
                }
                GraphCommand::Stop { voice, fade } => self.voices.stop(voice, fade),
                GraphCommand::StopAll { fade } => self.voices.stop_all(fade),
                GraphCommand::SetEq(settings) => self.chain.set_eq(&settings),
                GraphCommand::SetGate(settings) => self.chain.set_gate(&settings),
                GraphCommand::SetMasterGain(gain) => self.chain.set_master_gain(gain),
            }
        }
    }

    /// Render one output block (audio thread)
    pub fn process(&mut self, out: &mut StereoBuffer) {
        self.process_commands();

        out.fill_silence();
        self.voices.render(out);
        self.chain.process(out);

        self.mute
            .set_target(if self.shared.is_muted() { 0.0 } else { 1.0 });
        if self.mute.is_smoothing() || self.mute.current() != 1.0 {
            for sample in out.as_mut_slice() {
                *sample = *sample * self.mute.next();
            }
        }

        self.shared.meters.record_output(out);
        self.shared
            .active_voices
            .store(self.voices.active(), Ordering::Relaxed);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Control handle
// ═══════════════════════════════════════════════════════════════════════════════

/// Control-thread handle to a running graph
pub struct GraphHandle {
    commands: CommandSender,
    recorder: RecorderSink,
    shared: Arc<GraphShared>,
    sample_rate: u32,
    input_channels: usize,
    next_voice: VoiceId,
}

impl GraphHandle {
    /// Output (and recorder) sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn shared(&self) -> &Arc<GraphShared> {
        &self.shared
    }

    pub fn meters(&self) -> &MeterAtomics {
        &self.shared.meters
    }

    pub fn recorder(&mut self) -> &mut RecorderSink {
        &mut self.recorder
    }

    /// Frames the recorder has collected for the running take
    pub fn recorded_frames(&self) -> usize {
        self.recorder.captured_frames()
    }

    /// Mute or restore the monitor output (ramped on the audio thread)
    pub fn set_muted(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.shared.is_muted()
    }

    /// Start a voice on `range` of `buffer` (whole buffer when `None`)
    ///
    /// The buffer must already be at the output sample rate.
    pub fn play(
        &mut self,
        buffer: AudioBuffer,
        range: Option<Range<usize>>,
        looping: bool,
        gain: f32,
    ) -> GraphResult<VoiceId> {
        if buffer.sample_rate() != self.sample_rate {
            return Err(GraphError::SampleRateMismatch {
                expected: self.sample_rate,
                found: buffer.sample_rate(),
            });
        }
        let range = range.unwrap_or(0..buffer.len());
        let range = range.start.min(buffer.len())..range.end.min(buffer.len());
        if range.is_empty() {
            return Err(GraphError::EmptyBuffer);
        }

        let id = self.next_voice;
        let request = PlayRequest {
            id,
            buffer: Shared::new(&gc_handle(), buffer),
            range,
            looping,
            gain,
        };
        self.send(GraphCommand::Play(request))?;
        self.next_voice += 1;
        Ok(id)
    }

    pub fn stop(&mut self, voice: VoiceId, fade: bool) -> GraphResult<()> {
        self.send(GraphCommand::Stop { voice, fade })
    }

    pub fn stop_all(&mut self, fade: bool) -> GraphResult<()> {
        self.send(GraphCommand::StopAll { fade })
    }

    pub fn set_eq(&mut self, settings: EqSettings) -> GraphResult<()> {
        self.send(GraphCommand::SetEq(settings))
    }

    pub fn set_gate(&mut self, settings: GateSettings) -> GraphResult<()> {
        self.send(GraphCommand::SetGate(settings))
    }

    pub fn set_master_gain(&mut self, gain: f32) -> GraphResult<()> {
        self.send(GraphCommand::SetMasterGain(gain))
    }

    fn send(&mut self, cmd: GraphCommand) -> GraphResult<()> {
        self.commands.send(cmd).map_err(|_| {
            log::warn!("graph: command queue full");
            GraphError::QueueFull
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn graph(input_channels: usize) -> (InputGraph, OutputGraph, GraphHandle) {
        build(1000, input_channels, &EqSettings::default(), &GateSettings::default())
    }

    #[test]
    fn test_play_reaches_output() {
        let (_input, mut output, mut handle) = graph(1);
        let buffer = AudioBuffer::mono(1000, vec![0.5; 100]).unwrap();
        let id = handle.play(buffer, None, false, 1.0).unwrap();
        assert_eq!(id, 1);

        let mut out = StereoBuffer::silence(32);
        output.process(&mut out);
        assert_eq!(out[10].left, 0.5);
        assert_eq!(handle.shared().active_voices(), 1);
        assert!(handle.meters().output_peak() > 0.49);
    }

    #[test]
    fn test_play_validates_buffer() {
        let (_input, _output, mut handle) = graph(1);
        let wrong_rate = AudioBuffer::mono(44100, vec![0.5; 100]).unwrap();
        assert_eq!(
            handle.play(wrong_rate, None, false, 1.0),
            Err(GraphError::SampleRateMismatch { expected: 1000, found: 44100 })
        );
        let buffer = AudioBuffer::mono(1000, vec![0.5; 100]).unwrap();
        assert_eq!(handle.play(buffer, Some(200..300), false, 1.0), Err(GraphError::EmptyBuffer));
    }

    #[test]
    fn test_mute_ramps_output_down() {
        let (_input, mut output, mut handle) = graph(1);
        handle
            .play(AudioBuffer::mono(1000, vec![0.5; 1000]).unwrap(), None, true, 1.0)
            .unwrap();
        let mut out = StereoBuffer::silence(16);
        output.process(&mut out);

        handle.set_muted(true);
        output.process(&mut out);
        // 10 sample ramp at 1kHz
        assert!(out[0].left > 0.0);
        assert_eq!(out[12].left, 0.0);

        handle.set_muted(false);
        output.process(&mut out);
        assert_eq!(out[12].left, 0.5);
    }

    #[test]
    fn test_input_feeds_meters_and_recorder() {
        let (mut input, _output, mut handle) = graph(2);
        handle.recorder().start();
        input.process(&[0.1, -0.6, 0.2, 0.3]);
        assert_eq!(handle.meters().input_peak(), 0.6);
        input.process(&[0.0; 4]);
        // Last block is silent, the hold keeps the earlier peak
        assert_eq!(handle.meters().input_peak(), 0.0);
        assert_eq!(handle.meters().take_input_peak(), 0.6);
        assert_eq!(handle.meters().take_input_peak(), 0.0);

        let sink = handle.recorder();
        sink.drain();
        // The partial chunk is only handed over once recording stops
        assert_eq!(sink.captured_frames(), 0);

        let finished = AtomicBool::new(false);
        let take = std::thread::scope(|scope| {
            scope.spawn(|| {
                while !finished.load(Ordering::Acquire) {
                    input.process(&[]);
                    std::thread::sleep(Duration::from_millis(1));
                }
            });
            let take = sink.finish(Duration::from_millis(500)).unwrap();
            finished.store(true, Ordering::Release);
            take
        });
        assert!(take.flushed);
        assert_eq!(take.buffer.len(), 4);
        assert_eq!(take.buffer.channel(1), &[-0.6, 0.3, 0.0, 0.0][..]);
    }

    #[test]
    fn test_rejected_voices_are_counted() {
        let (_input, mut output, mut handle) = graph(1);
        for _ in 0..MAX_VOICES + 2 {
            handle
                .play(AudioBuffer::mono(1000, vec![0.01; 100]).unwrap(), None, true, 1.0)
                .unwrap();
        }
        let mut out = StereoBuffer::silence(8);
        output.process(&mut out);
        assert_eq!(handle.shared().active_voices(), MAX_VOICES);
        assert_eq!(handle.shared().rejected_voices(), 2);
    }
}
