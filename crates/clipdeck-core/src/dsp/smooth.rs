//! Linear parameter ramps for click-free changes in the audio thread

/// Default ramp length for gain and EQ changes
pub const DEFAULT_RAMP_SECONDS: f32 = 0.02;

/// A value that moves linearly towards its target over a fixed number of samples
#[derive(Debug, Clone, Copy)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
    ramp_samples: u32,
}

impl SmoothedParam {
    pub fn new(value: f32, ramp_samples: u32) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
            ramp_samples: ramp_samples.max(1),
        }
    }

    /// Ramp of [`DEFAULT_RAMP_SECONDS`] at `sample_rate`
    pub fn with_default_ramp(value: f32, sample_rate: u32) -> Self {
        Self::new(value, (sample_rate as f32 * DEFAULT_RAMP_SECONDS).round() as u32)
    }

    pub fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        self.target = target;
        self.remaining = self.ramp_samples;
        self.step = (target - self.current) / self.ramp_samples as f32;
    }

    /// Jump to `value` with no ramp
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.remaining = 0;
        self.step = 0.0;
    }

    /// Advance one sample and return the new value
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 { self.target } else { self.current + self.step };
        }
        self.current
    }

    /// Advance `samples` at once
    pub fn advance(&mut self, samples: u32) -> f32 {
        if samples >= self.remaining {
            self.remaining = 0;
            self.current = self.target;
        } else {
            self.remaining -= samples;
            self.current += self.step * samples as f32;
        }
        self.current
    }

    pub fn is_smoothing(&self) -> bool {
        self.remaining > 0
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_reaches_target_exactly() {
        let mut param = SmoothedParam::new(0.0, 4);
        param.set_target(1.0);
        let values: Vec<f32> = (0..6).map(|_| param.next()).collect();
        assert_eq!(values, vec![0.25, 0.5, 0.75, 1.0, 1.0, 1.0]);
        assert!(!param.is_smoothing());
    }

    #[test]
    fn test_retarget_mid_ramp() {
        let mut param = SmoothedParam::new(1.0, 10);
        param.set_target(0.0);
        param.advance(5);
        assert!((param.current() - 0.5).abs() < 1e-6);
        param.set_target(1.0);
        assert!(param.is_smoothing());
        assert_eq!(param.advance(100), 1.0);
    }

    #[test]
    fn test_default_ramp_length() {
        let mut param = SmoothedParam::with_default_ramp(0.0, 48000);
        param.set_target(1.0);
        assert!(param.advance(959) < 1.0);
        assert_eq!(param.next(), 1.0);
    }
}
