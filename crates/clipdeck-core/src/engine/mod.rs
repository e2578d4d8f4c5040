//! Engine - recording state machine and session control
//!
//! This module ties the real-time graph to the rest of the system:
//! - Engine: owns the graph handle, runs Idle → Armed → Recording → Idle
//! - Events: state changes, threshold crossings and finished takes
//! - Snapshots: read-only views for observers
//! - GC: deferred deallocation of buffers released on the audio thread

mod controller;
mod error;
mod event;
pub mod gc;
mod state;

pub use controller::*;
pub use error::*;
pub use event::*;
pub use state::*;
