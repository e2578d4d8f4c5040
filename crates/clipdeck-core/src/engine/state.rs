//! Engine state and read-only snapshots

use std::fmt;

use crate::params::{EqSettings, GateSettings};

/// Recording lifecycle
///
/// ```text
/// Idle ──arm──► Armed ──threshold / start──► Recording ──stop──► Idle
///   │                                            ▲
///   └──────────────────start─────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineState {
    #[default]
    Idle,
    /// Watching the input level for the auto-record threshold
    Armed,
    Recording,
}

impl EngineState {
    pub fn name(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Armed => "armed",
            EngineState::Recording => "recording",
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, EngineState::Recording)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Point-in-time view of the engine for observers
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub state: EngineState,
    /// Auto-record threshold, 0 - 100
    pub threshold: f32,
    /// Loudest input channel of the last input block
    pub input_peak: f32,
    /// Loudest output channel of the last output block
    pub output_peak: f32,
    pub active_voices: usize,
    /// Monitor output muted (while recording)
    pub muted: bool,
    /// Frames captured so far by the running take
    pub recorded_frames: usize,
    pub eq: EqSettings,
    pub gate: GateSettings,
}
