//! Lock-free command queue into the output callback
//!
//! The control thread pushes [`GraphCommand`]s into an `rtrb` ring buffer and
//! the output callback drains it at the start of every block. Both sides are
//! wait-free; nothing in a command allocates or frees on the audio thread
//! (sample buffers travel as `basedrop::Shared`).

use crate::params::{EqSettings, GateSettings};

use super::voice::{PlayRequest, VoiceId};

/// Capacity of the command queue
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Commands sent from the control thread to the output graph
pub enum GraphCommand {
    // ─────────────────────────────────────────────────────────────
    // Playback
    // ─────────────────────────────────────────────────────────────
    /// Start a voice
    Play(PlayRequest),
    /// Stop one voice, optionally with the short stop fade
    Stop { voice: VoiceId, fade: bool },
    /// Stop every voice
    StopAll { fade: bool },

    // ─────────────────────────────────────────────────────────────
    // Processing chain (ramped on the audio thread)
    // ─────────────────────────────────────────────────────────────
    SetEq(EqSettings),
    SetGate(GateSettings),
    SetMasterGain(f32),
}

/// Create the command ring buffer
pub fn command_channel() -> (rtrb::Producer<GraphCommand>, rtrb::Consumer<GraphCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

/// Control-side end of the command queue
pub struct CommandSender {
    pub(crate) producer: rtrb::Producer<GraphCommand>,
}

impl CommandSender {
    /// Queue a command without blocking
    ///
    /// Returns the command back when the queue is full.
    pub fn send(&mut self, cmd: GraphCommand) -> Result<(), GraphCommand> {
        self.producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    pub fn has_space(&self) -> bool {
        self.producer.slots() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_queue_returns_command() {
        let (producer, mut consumer) = command_channel();
        let mut sender = CommandSender { producer };

        for _ in 0..COMMAND_QUEUE_CAPACITY {
            assert!(sender.send(GraphCommand::StopAll { fade: false }).is_ok());
        }
        assert!(!sender.has_space());
        match sender.send(GraphCommand::SetMasterGain(0.5)) {
            Err(GraphCommand::SetMasterGain(gain)) => assert_eq!(gain, 0.5),
            _ => panic!("expected the command back"),
        }

        assert!(matches!(consumer.pop(), Ok(GraphCommand::StopAll { fade: false })));
        assert!(sender.has_space());
    }
}
