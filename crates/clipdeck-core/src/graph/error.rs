//! Errors from the control side of the real-time graph

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Graph command queue is full")]
    QueueFull,

    #[error("Buffer is at {found}Hz but the output runs at {expected}Hz")]
    SampleRateMismatch { expected: u32, found: u32 },

    #[error("Buffer has no frames to play")]
    EmptyBuffer,
}

pub type GraphResult<T> = Result<T, GraphError>;
