//! Notifications from the engine to its observers
//!
//! Delivered over an unbounded crossbeam channel created with the engine.

use std::sync::Arc;

use crate::types::AudioBuffer;

use super::state::EngineState;

/// A finished recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    /// WAV file bytes at the configured recording bit depth
    pub wav: Vec<u8>,
    /// Decoded take; `None` when nothing was captured
    pub buffer: Option<AudioBuffer>,
    /// Frames lost to recorder overflow
    pub dropped_frames: u64,
    /// False when the input stream never confirmed the end of the take
    pub flushed: bool,
}

impl RecordingResult {
    pub fn is_empty(&self) -> bool {
        self.buffer.is_none()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.buffer.as_ref().map_or(0.0, AudioBuffer::duration_seconds)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChanged { from: EngineState, to: EngineState },
    /// The input crossed the auto-record threshold while armed
    ThresholdExceeded { peak: f32 },
    RecordingStarted,
    /// Fired exactly once per take, including empty ones
    RecordingStopped(Arc<RecordingResult>),
}

pub type EventSender = crossbeam::channel::Sender<EngineEvent>;
pub type EventReceiver = crossbeam::channel::Receiver<EngineEvent>;
