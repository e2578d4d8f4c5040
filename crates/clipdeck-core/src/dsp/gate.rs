//! Envelope follower and noise gate
//!
//! The gate keys off a peak envelope (fast attack, slow release) and moves its
//! gain with separate open/close time constants. It starts closed, so material
//! below the threshold at the very start of a buffer never leaks through.

/// Envelope attack time in seconds
pub const ENVELOPE_ATTACK_SECONDS: f32 = 0.0001;

/// Envelope release time in seconds
pub const ENVELOPE_RELEASE_SECONDS: f32 = 0.05;

/// Gate opening time constant in seconds
pub const GATE_OPEN_SECONDS: f32 = 0.001;

/// Gate closing time constant in seconds
pub const GATE_CLOSE_SECONDS: f32 = 0.08;

/// One-pole coefficient for a time constant
fn time_coeff(seconds: f32, sample_rate: f32) -> f32 {
    if seconds <= 0.0 || sample_rate <= 0.0 {
        return 0.0;
    }
    (-1.0 / (seconds * sample_rate)).exp()
}

/// Peak envelope follower
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeFollower {
    attack: f32,
    release: f32,
    envelope: f32,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f32, attack_seconds: f32, release_seconds: f32) -> Self {
        Self {
            attack: time_coeff(attack_seconds, sample_rate),
            release: time_coeff(release_seconds, sample_rate),
            envelope: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let level = input.abs();
        let coeff = if level > self.envelope { self.attack } else { self.release };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * level;
        self.envelope
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// Noise gate gain computer
#[derive(Debug, Clone, Copy)]
pub struct GateProcessor {
    follower: EnvelopeFollower,
    open: f32,
    close: f32,
    gain: f32,
    threshold: f32,
    closed_gain: f32,
}

impl GateProcessor {
    pub fn new(sample_rate: f32, threshold: f32, closed_gain: f32) -> Self {
        Self {
            follower: EnvelopeFollower::new(sample_rate, ENVELOPE_ATTACK_SECONDS, ENVELOPE_RELEASE_SECONDS),
            open: time_coeff(GATE_OPEN_SECONDS, sample_rate),
            close: time_coeff(GATE_CLOSE_SECONDS, sample_rate),
            gain: closed_gain,
            threshold,
            closed_gain,
        }
    }

    /// Change threshold and depth without resetting the envelope
    pub fn set_params(&mut self, threshold: f32, closed_gain: f32) {
        self.threshold = threshold;
        self.closed_gain = closed_gain;
    }

    /// Feed one key sample and return the gain to apply to that frame
    #[inline]
    pub fn next_gain(&mut self, key: f32) -> f32 {
        let envelope = self.follower.process(key);
        let target = if envelope > self.threshold { 1.0 } else { self.closed_gain };
        let coeff = if target > self.gain { self.open } else { self.close };
        self.gain = coeff * self.gain + (1.0 - coeff) * target;
        self.gain
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn is_open(&self) -> bool {
        self.follower.envelope() > self.threshold
    }

    pub fn reset(&mut self) {
        self.follower.reset();
        self.gain = self.closed_gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_attack_is_fast_release_is_slow() {
        let mut follower = EnvelopeFollower::new(48000.0, ENVELOPE_ATTACK_SECONDS, ENVELOPE_RELEASE_SECONDS);
        for _ in 0..48 {
            follower.process(1.0);
        }
        assert!(follower.envelope() > 0.99);

        // 10ms of silence only releases a fraction of the 50ms time constant
        for _ in 0..480 {
            follower.process(0.0);
        }
        assert!(follower.envelope() > 0.7);
    }

    #[test]
    fn test_gate_stays_closed_below_threshold() {
        let mut gate = GateProcessor::new(48000.0, 0.01, 0.0);
        for i in 0..4800 {
            let x = if i % 2 == 0 { 0.005 } else { -0.005 };
            assert_eq!(gate.next_gain(x), 0.0);
        }
    }

    #[test]
    fn test_gate_opens_on_loud_input() {
        let mut gate = GateProcessor::new(48000.0, 0.01, 0.2);
        assert_eq!(gate.gain(), 0.2);
        let mut gain = 0.0;
        for _ in 0..480 {
            gain = gate.next_gain(0.5);
        }
        assert!(gain > 0.99);
        assert!(gate.is_open());

        gate.reset();
        assert_eq!(gate.gain(), 0.2);
    }
}
