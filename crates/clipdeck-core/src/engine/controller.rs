//! The engine controller
//!
//! Owns the control half of the graph and the recording state machine. It is
//! the only place that changes the live graph; everything else observes it
//! through [`EngineSnapshot`] and [`EngineEvent`].
//!
//! The controller is driven from the control thread: call [`Engine::tick`] at
//! a fixed cadence (once per UI frame) to poll the auto-record threshold and
//! to keep the recorder's chunk pool recycled.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel;

use crate::analysis::{detect_bpm_with_options, detect_key, BpmResult, KeyResult};
use crate::codec::{encode_export, encode_wav, ExportFormat};
use crate::config::{threshold_to_amplitude, EngineConfig};
use crate::graph::{GraphHandle, RecordedTake, VoiceId};
use crate::params::{BitDepth, EqSettings, GateSettings};
use crate::transform::{crop_chop, render, resample, NoiseModel, RenderOptions};
use crate::types::{AudioBuffer, Chop};

use super::error::{EngineError, EngineResult};
use super::event::{EngineEvent, EventReceiver, EventSender, RecordingResult};
use super::state::{EngineSnapshot, EngineState};

/// Recording state machine, live playback and offline processing
pub struct Engine {
    config: EngineConfig,
    graph: GraphHandle,
    state: EngineState,
    /// Auto-record threshold, 0 - 100
    threshold: f32,
    /// Set while the polled input stays above the threshold
    above_threshold: bool,
    eq: EqSettings,
    gate: GateSettings,
    master_gain: f32,
    noise_model: Option<Box<dyn NoiseModel>>,
    events: EventSender,
}

impl Engine {
    /// Create an engine on top of a built graph
    ///
    /// Returns the receiving end of the event channel.
    pub fn new(config: EngineConfig, graph: GraphHandle) -> (Self, EventReceiver) {
        let (events, receiver) = channel::unbounded();
        let mut engine = Self {
            threshold: clamp_threshold(config.threshold),
            above_threshold: false,
            eq: config.eq,
            gate: config.gate,
            master_gain: 1.0,
            noise_model: None,
            state: EngineState::Idle,
            config,
            graph,
            events,
        };

        // The graph may have been built with different settings
        if let Err(e) = engine.push_params() {
            log::warn!("engine: could not apply initial EQ/gate: {}", e);
        }
        log::info!(
            "engine: ready at {}Hz, {} input channels",
            engine.graph.sample_rate(),
            engine.graph.input_channels()
        );
        (engine, receiver)
    }

    fn push_params(&mut self) -> EngineResult<()> {
        self.graph.set_eq(self.eq)?;
        self.graph.set_gate(self.gate)?;
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &GraphHandle {
        &self.graph
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let shared = self.graph.shared();
        EngineSnapshot {
            state: self.state,
            threshold: self.threshold,
            input_peak: shared.meters.input_peak(),
            output_peak: shared.meters.output_peak(),
            active_voices: shared.active_voices(),
            muted: shared.is_muted(),
            recorded_frames: self.graph.recorded_frames(),
            eq: self.eq,
            gate: self.gate,
        }
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            log::debug!("engine: event dropped, no receiver");
        }
    }

    fn transition(&mut self, to: EngineState) {
        let from = self.state;
        self.state = to;
        log::info!("engine: {} -> {}", from, to);
        self.emit(EngineEvent::StateChanged { from, to });
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Recording state machine
    // ═══════════════════════════════════════════════════════════════════════

    /// Start watching the input for the auto-record threshold
    pub fn arm(&mut self) -> EngineResult<()> {
        match self.state {
            EngineState::Idle => {
                // The held peak is stale. A signal still above the threshold
                // must drop back before it fires.
                let meters = self.graph.meters();
                meters.take_input_peak();
                self.above_threshold = meters.input_peak() > threshold_to_amplitude(self.threshold);
                self.transition(EngineState::Armed);
                Ok(())
            }
            EngineState::Armed => Ok(()),
            EngineState::Recording => Err(EngineError::InvalidTransition {
                from: self.state,
                action: "arm",
            }),
        }
    }

    pub fn disarm(&mut self) -> EngineResult<()> {
        match self.state {
            EngineState::Armed => {
                self.transition(EngineState::Idle);
                Ok(())
            }
            EngineState::Idle => Ok(()),
            EngineState::Recording => Err(EngineError::InvalidTransition {
                from: self.state,
                action: "disarm",
            }),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Set the auto-record threshold (0 - 100)
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = clamp_threshold(threshold);
        log::debug!("engine: threshold {}", self.threshold);
    }

    /// Poll the input level and service the recorder
    pub fn tick(&mut self) -> EngineResult<()> {
        match self.state {
            EngineState::Idle => Ok(()),
            EngineState::Armed => {
                let peak = self.graph.meters().take_input_peak();
                let above = peak > threshold_to_amplitude(self.threshold);
                if !above {
                    self.above_threshold = false;
                    return Ok(());
                }
                if self.above_threshold {
                    // Same excursion as the last trigger
                    return Ok(());
                }
                self.above_threshold = true;
                log::info!("engine: input peak {:.3} crossed the threshold", peak);
                self.emit(EngineEvent::ThresholdExceeded { peak });
                self.start_recording()
            }
            EngineState::Recording => {
                self.graph.recorder().drain();
                Ok(())
            }
        }
    }

    /// Start a take, muting the monitor output
    pub fn start_recording(&mut self) -> EngineResult<()> {
        if self.state.is_recording() {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                action: "start recording",
            });
        }
        self.graph.set_muted(true);
        self.graph.recorder().start();
        self.transition(EngineState::Recording);
        self.emit(EngineEvent::RecordingStarted);
        Ok(())
    }

    /// Finish the take and return to idle
    ///
    /// The monitor is always un-muted and exactly one
    /// [`EngineEvent::RecordingStopped`] is emitted, also for an empty take
    /// or one the input stream never flushed.
    pub fn stop_recording(&mut self) -> EngineResult<Arc<RecordingResult>> {
        if !self.state.is_recording() {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                action: "stop recording",
            });
        }

        self.graph.set_muted(false);
        let timeout = Duration::from_millis(self.config.recorder_flush_timeout_ms);
        let result = match self.graph.recorder().finish(timeout) {
            Ok(take) => recording_result(take, self.config.recording_bit_depth),
            Err(e) => {
                log::error!("engine: could not assemble the take: {}", e);
                RecordingResult {
                    wav: Vec::new(),
                    buffer: None,
                    dropped_frames: 0,
                    flushed: false,
                }
            }
        };
        let result = Arc::new(result);

        self.transition(EngineState::Idle);
        log::info!(
            "engine: recording stopped, {:.2}s captured",
            result.duration_seconds()
        );
        self.emit(EngineEvent::RecordingStopped(Arc::clone(&result)));
        Ok(result)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Playback
    // ═══════════════════════════════════════════════════════════════════════

    /// Play a whole buffer
    pub fn play(&mut self, buffer: &AudioBuffer, looping: bool, gain: f32) -> EngineResult<VoiceId> {
        self.start_voice(buffer.clone(), looping, gain)
    }

    /// Play the frames of one chop
    pub fn play_chop(
        &mut self,
        buffer: &AudioBuffer,
        chop: &Chop,
        looping: bool,
        gain: f32,
    ) -> EngineResult<VoiceId> {
        let cropped = crop_chop(buffer, chop)?;
        self.start_voice(cropped, looping, gain)
    }

    fn start_voice(&mut self, buffer: AudioBuffer, looping: bool, gain: f32) -> EngineResult<VoiceId> {
        let rate = self.graph.sample_rate();
        let buffer = if buffer.sample_rate() != rate && !buffer.is_empty() {
            log::debug!("engine: resampling {}Hz -> {}Hz for playback", buffer.sample_rate(), rate);
            resample(&buffer, rate)?
        } else {
            buffer
        };
        let voice = self.graph.play(buffer, None, looping, gain.max(0.0))?;
        log::debug!("engine: voice {} started (looping: {})", voice, looping);
        Ok(voice)
    }

    /// Stop one voice, fading if configured
    pub fn stop_voice(&mut self, voice: VoiceId) -> EngineResult<()> {
        self.graph.stop(voice, self.config.stop_fade)?;
        Ok(())
    }

    pub fn stop_all(&mut self) -> EngineResult<()> {
        self.graph.stop_all(self.config.stop_fade)?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Live parameters
    // ═══════════════════════════════════════════════════════════════════════

    pub fn eq(&self) -> &EqSettings {
        &self.eq
    }

    /// Update the output EQ (ramped on the audio thread)
    pub fn set_eq(&mut self, eq: EqSettings) -> EngineResult<()> {
        self.graph.set_eq(eq)?;
        self.eq = eq;
        Ok(())
    }

    pub fn gate(&self) -> &GateSettings {
        &self.gate
    }

    /// Update the output noise gate (ramped on the audio thread)
    pub fn set_gate(&mut self, gate: GateSettings) -> EngineResult<()> {
        self.graph.set_gate(gate)?;
        self.gate = gate;
        Ok(())
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn set_master_gain(&mut self, gain: f32) -> EngineResult<()> {
        let gain = gain.max(0.0);
        self.graph.set_master_gain(gain)?;
        self.master_gain = gain;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Offline processing
    // ═══════════════════════════════════════════════════════════════════════

    /// Install the advanced denoiser used by [`Engine::render`]
    pub fn set_noise_model(&mut self, model: Box<dyn NoiseModel>) {
        log::info!("engine: noise model '{}' installed", model.name());
        self.noise_model = Some(model);
    }

    pub fn analyze_bpm(&self, buffer: &AudioBuffer) -> Option<BpmResult> {
        detect_bpm_with_options(buffer, self.config.bpm_range)
    }

    pub fn analyze_key(&self, buffer: &AudioBuffer) -> KeyResult {
        detect_key(buffer)
    }

    /// Render a buffer offline
    ///
    /// When `options` leaves EQ or gate unset, the live settings are used if enabled.
    pub fn render(&self, buffer: &AudioBuffer, mut options: RenderOptions) -> EngineResult<AudioBuffer> {
        if options.eq.is_none() && self.eq.enabled {
            options.eq = Some(self.eq);
        }
        if options.gate.is_none() && self.gate.enabled {
            options.gate = Some(self.gate);
        }
        Ok(render(buffer, &options, self.noise_model.as_deref())?)
    }

    /// Encode a buffer for download
    pub fn export(&self, buffer: &AudioBuffer, format: ExportFormat) -> EngineResult<Vec<u8>> {
        Ok(encode_export(buffer, format)?)
    }

    /// MP3 at the configured bitrate
    pub fn export_mp3(&self, buffer: &AudioBuffer) -> EngineResult<Vec<u8>> {
        self.export(buffer, ExportFormat::Mp3(self.config.mp3_bitrate))
    }
}

fn clamp_threshold(threshold: f32) -> f32 {
    if threshold.is_nan() {
        0.0
    } else {
        threshold.clamp(0.0, 100.0)
    }
}

fn recording_result(take: RecordedTake, depth: BitDepth) -> RecordingResult {
    let wav = match encode_wav(&take.buffer, depth) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("engine: could not encode the take: {}", e);
            Vec::new()
        }
    };
    RecordingResult {
        wav,
        buffer: (!take.buffer.is_empty()).then_some(take.buffer),
        dropped_frames: take.dropped_frames,
        flushed: take.flushed,
    }
}
