//! RBJ cookbook biquads

use std::f32::consts::PI;

/// Per-channel direct form I history
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    #[inline]
    pub fn process(&mut self, input: f32, coeffs: &BiquadCoeffs) -> f32 {
        let out = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = out;
        out
    }

    /// Advance the history as an identity filter would, leaving the sample untouched
    #[inline]
    pub fn bypass(&mut self, input: f32) {
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = input;
    }

    /// Filter a block in place
    pub fn process_block(&mut self, samples: &mut [f32], coeffs: &BiquadCoeffs) {
        for sample in samples.iter_mut() {
            *sample = self.process(*sample, coeffs);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Normalized biquad coefficients (a0 = 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoeffs {
    /// Peaking EQ filter coefficients
    ///
    /// The center frequency is kept below Nyquist so high bands stay stable at
    /// low sample rates.
    pub fn peaking(freq: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        let freq = freq.min(sample_rate * 0.49);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }

    pub fn passthrough() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }
    }

    /// Magnitude response at `freq`
    pub fn magnitude_at(&self, freq: f32, sample_rate: f32) -> f32 {
        let w = 2.0 * PI * freq / sample_rate;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());

        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);

        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::passthrough()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(linear: f32) -> f32 {
        20.0 * linear.log10()
    }

    #[test]
    fn test_peaking_gain_at_center() {
        let coeffs = BiquadCoeffs::peaking(1000.0, 6.0, 1.0, 48000.0);
        assert!((db(coeffs.magnitude_at(1000.0, 48000.0)) - 6.0).abs() < 0.05);
        // Far from the center the band is flat
        assert!(db(coeffs.magnitude_at(20.0, 48000.0)).abs() < 0.1);

        let cut = BiquadCoeffs::peaking(100.0, -12.0, 0.7, 44100.0);
        assert!((db(cut.magnitude_at(100.0, 44100.0)) + 12.0).abs() < 0.05);
    }

    #[test]
    fn test_zero_gain_is_transparent() {
        let coeffs = BiquadCoeffs::peaking(8000.0, 0.0, 0.7, 48000.0);
        let mut state = BiquadState::default();
        let mut samples: Vec<f32> = (0..512).map(|i| ((i as f32) * 0.37).sin() * 0.5).collect();
        let original = samples.clone();
        state.process_block(&mut samples, &coeffs);

        for (a, b) in samples.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_frequency_above_nyquist_stays_stable() {
        let coeffs = BiquadCoeffs::peaking(20000.0, 12.0, 18.0, 22050.0);
        let mut state = BiquadState::default();
        let mut peak = 0.0f32;
        for i in 0..22050 {
            let x = if i == 0 { 1.0 } else { 0.0 };
            peak = peak.max(state.process(x, &coeffs).abs());
        }
        assert!(peak.is_finite());
        assert!(state.process(0.0, &coeffs).abs() < 1e-3);
    }
}
