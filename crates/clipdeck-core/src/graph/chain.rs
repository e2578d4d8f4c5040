//! Output processing chain
//!
//! The signal path is a fixed list of stages built once:
//!
//! ```text
//! voices ─► Gate ─► EQ low ─► EQ mid ─► EQ high ─► Gain ─► out
//! ```
//!
//! Nothing is added or removed at runtime. Parameter updates only move
//! targets; every stage ramps towards them so live changes never click.
//! A disabled gate fades its wet mix to zero and a disabled EQ ramps its
//! bands to 0 dB.

use crate::dsp::{BiquadCoeffs, BiquadState, GateProcessor, SmoothedParam};
use crate::params::{EqBandKind, EqSettings, GateSettings};
use crate::types::StereoBuffer;

/// Samples between coefficient updates while an EQ band is ramping
pub const EQ_UPDATE_INTERVAL: usize = 32;

/// One stage of the output signal path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Gate,
    EqLow,
    EqMid,
    EqHigh,
    Gain,
}

/// Stage order of the output chain
pub const SIGNAL_PATH: [StageKind; 5] = [
    StageKind::Gate,
    StageKind::EqLow,
    StageKind::EqMid,
    StageKind::EqHigh,
    StageKind::Gain,
];

/// Smoothed peaking band with per-channel filter state
struct EqStage {
    kind: EqBandKind,
    frequency: SmoothedParam,
    q: SmoothedParam,
    gain_db: SmoothedParam,
    coeffs: BiquadCoeffs,
    state: [BiquadState; 2],
    sample_rate: f32,
}

impl EqStage {
    fn new(kind: EqBandKind, settings: &EqSettings, sample_rate: u32) -> Self {
        let band = settings.effective_band(kind);
        let sr = sample_rate as f32;
        Self {
            kind,
            frequency: SmoothedParam::with_default_ramp(band.frequency, sample_rate),
            q: SmoothedParam::with_default_ramp(band.q, sample_rate),
            gain_db: SmoothedParam::with_default_ramp(band.gain_db, sample_rate),
            coeffs: BiquadCoeffs::peaking(band.frequency, band.gain_db, band.q, sr),
            state: [BiquadState::default(); 2],
            sample_rate: sr,
        }
    }

    fn set(&mut self, settings: &EqSettings) {
        let band = settings.effective_band(self.kind);
        self.frequency.set_target(band.frequency);
        self.q.set_target(band.q);
        self.gain_db.set_target(band.gain_db);
    }

    fn is_smoothing(&self) -> bool {
        self.frequency.is_smoothing() || self.q.is_smoothing() || self.gain_db.is_smoothing()
    }

    fn process(&mut self, buffer: &mut StereoBuffer) {
        if !self.is_smoothing() && self.gain_db.current() == 0.0 {
            let [left, right] = &mut self.state;
            for sample in buffer.as_slice() {
                left.bypass(sample.left);
                right.bypass(sample.right);
            }
            return;
        }
        for block in buffer.as_mut_slice().chunks_mut(EQ_UPDATE_INTERVAL) {
            if self.is_smoothing() {
                let step = block.len() as u32;
                let frequency = self.frequency.advance(step);
                let q = self.q.advance(step);
                let gain_db = self.gain_db.advance(step);
                self.coeffs = BiquadCoeffs::peaking(frequency, gain_db, q, self.sample_rate);
            }
            let [left, right] = &mut self.state;
            for sample in block.iter_mut() {
                sample.left = left.process(sample.left, &self.coeffs);
                sample.right = right.process(sample.right, &self.coeffs);
            }
        }
    }
}

/// The gate, three EQ bands and master gain of the output path
pub struct ProcessingChain {
    gate: GateProcessor,
    /// 0 = bypassed, 1 = fully gated
    gate_mix: SmoothedParam,
    eq: [EqStage; 3],
    master: SmoothedParam,
}

impl ProcessingChain {
    pub fn new(sample_rate: u32, eq: &EqSettings, gate: &GateSettings, master_gain: f32) -> Self {
        let mix = if gate.enabled { 1.0 } else { 0.0 };
        Self {
            gate: GateProcessor::new(sample_rate as f32, gate.threshold(), gate.closed_gain()),
            gate_mix: SmoothedParam::with_default_ramp(mix, sample_rate),
            eq: EqBandKind::ALL.map(|kind| EqStage::new(kind, eq, sample_rate)),
            master: SmoothedParam::with_default_ramp(master_gain, sample_rate),
        }
    }

    pub fn set_eq(&mut self, settings: &EqSettings) {
        for stage in &mut self.eq {
            stage.set(settings);
        }
    }

    pub fn set_gate(&mut self, settings: &GateSettings) {
        self.gate.set_params(settings.threshold(), settings.closed_gain());
        self.gate_mix.set_target(if settings.enabled { 1.0 } else { 0.0 });
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.master.set_target(gain.max(0.0));
    }

    /// Run the block through every stage of [`SIGNAL_PATH`]
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for stage in SIGNAL_PATH {
            match stage {
                StageKind::Gate => self.process_gate(buffer),
                StageKind::EqLow => self.eq[0].process(buffer),
                StageKind::EqMid => self.eq[1].process(buffer),
                StageKind::EqHigh => self.eq[2].process(buffer),
                StageKind::Gain => self.process_gain(buffer),
            }
        }
    }

    fn process_gate(&mut self, buffer: &mut StereoBuffer) {
        if !self.gate_mix.is_smoothing() && self.gate_mix.current() == 0.0 {
            // Keep the envelope tracking so re-enabling starts from the right state
            for sample in buffer.as_slice() {
                self.gate.next_gain(sample.left);
            }
            return;
        }
        for sample in buffer.as_mut_slice() {
            let gate_gain = self.gate.next_gain(sample.left);
            let mix = self.gate_mix.next();
            let gain = 1.0 + mix * (gate_gain - 1.0);
            sample.left *= gain;
            sample.right *= gain;
        }
    }

    fn process_gain(&mut self, buffer: &mut StereoBuffer) {
        if !self.master.is_smoothing() && self.master.current() == 1.0 {
            return;
        }
        for sample in buffer.as_mut_slice() {
            *sample = *sample * self.master.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::EqBand;

    const RATE: u32 = 48000;

    fn sine_block(freq: f32, frames: usize, offset: usize) -> StereoBuffer {
        let mut buffer = StereoBuffer::silence(frames);
        for (i, sample) in buffer.as_mut_slice().iter_mut().enumerate() {
            let t = (i + offset) as f32 / RATE as f32;
            let v = (2.0 * std::f32::consts::PI * freq * t).sin() * 0.25;
            sample.left = v;
            sample.right = v;
        }
        buffer
    }

    /// Process blocks `first..first + blocks` of a continuous sine, returning the last peak
    fn run(chain: &mut ProcessingChain, freq: f32, first: usize, blocks: usize) -> f32 {
        let mut last_peak = 0.0;
        for b in first..first + blocks {
            let mut block = sine_block(freq, 512, b * 512);
            chain.process(&mut block);
            last_peak = block.peak();
        }
        last_peak
    }

    #[test]
    fn test_signal_path_order() {
        assert_eq!(SIGNAL_PATH[0], StageKind::Gate);
        assert_eq!(SIGNAL_PATH[4], StageKind::Gain);
    }

    #[test]
    fn test_default_chain_is_transparent() {
        let mut chain = ProcessingChain::new(RATE, &EqSettings::default(), &GateSettings::default(), 1.0);
        let input = sine_block(440.0, 512, 0);
        let mut block = input.clone();
        chain.process(&mut block);
        for (a, b) in input.as_slice().iter().zip(block.as_slice()) {
            assert!((a.left - b.left).abs() < 1e-5);
        }
    }

    #[test]
    fn test_eq_change_ramps_to_target() {
        let mut chain = ProcessingChain::new(RATE, &EqSettings::default(), &GateSettings::default(), 1.0);
        run(&mut chain, 1000.0, 0, 4);

        let mut eq = EqSettings::default();
        eq.enabled = true;
        eq.mid = EqBand::new(1000.0, 1.0, 12.0);
        chain.set_eq(&eq);

        // The first block after the change is still on its way up
        let mut first = sine_block(1000.0, 512, 4 * 512);
        chain.process(&mut first);
        let settled = run(&mut chain, 1000.0, 5, 10);

        let expected = 0.25 * 10f32.powf(12.0 / 20.0);
        assert!(first.peak() < settled);
        assert!((settled - expected).abs() / expected < 0.05, "settled {}", settled);
    }

    #[test]
    fn test_master_gain_ramp() {
        let mut chain = ProcessingChain::new(RATE, &EqSettings::default(), &GateSettings::default(), 1.0);
        chain.set_master_gain(0.0);
        let mut block = StereoBuffer::silence(2048);
        for sample in block.as_mut_slice() {
            sample.left = 1.0;
            sample.right = 1.0;
        }
        chain.process(&mut block);
        assert!(block[0].left > 0.99);
        assert!(block[480].left > 0.0 && block[480].left < 1.0);
        assert_eq!(block[2000].left, 0.0);
    }

    #[test]
    fn test_enabled_gate_closes_on_quiet_input() {
        let gate = GateSettings {
            enabled: true,
            sensitivity: 0.5,
            amount: 1.0,
        };
        let mut chain = ProcessingChain::new(RATE, &EqSettings::default(), &gate, 1.0);

        // 0.25 peak is well above the 0.01 threshold
        let loud = run(&mut chain, 440.0, 0, 8);
        assert!(loud > 0.24);

        let quiet_block = || {
            let mut block = StereoBuffer::silence(512);
            for (i, sample) in block.as_mut_slice().iter_mut().enumerate() {
                sample.left = if i % 2 == 0 { 0.002 } else { -0.002 };
                sample.right = sample.left;
            }
            block
        };
        // Envelope release plus the 80ms close, with margin
        for _ in 0..59 {
            chain.process(&mut quiet_block());
        }
        let mut quiet = quiet_block();
        chain.process(&mut quiet);
        assert!(quiet.peak() < 0.0002, "gate leaked {}", quiet.peak());
    }
}
