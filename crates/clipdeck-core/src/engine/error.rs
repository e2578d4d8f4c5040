//! Engine error types

use thiserror::Error;

use crate::codec::CodecError;
use crate::graph::GraphError;
use crate::transform::TransformError;

use super::state::EngineState;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The requested action is not allowed in the current state
    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: EngineState, action: &'static str },

    /// The real-time command queue is full
    #[error("Audio command queue is full")]
    QueueFull,

    #[error("Playback error: {0}")]
    Graph(GraphError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::QueueFull => EngineError::QueueFull,
            other => EngineError::Graph(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
