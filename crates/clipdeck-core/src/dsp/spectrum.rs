//! Windowed FFT helpers over realfft

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{FftError, RealFftPlanner, RealToComplex};

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Hann-windowed magnitude spectrum of fixed-size frames
///
/// Buffers are allocated once; each call reuses them.
pub struct MagnitudeAnalyzer {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl MagnitudeAnalyzer {
    pub fn new(size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);
        let spectrum = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        Self {
            fft,
            window: hann_window(size),
            frame: vec![0.0; size],
            spectrum,
            scratch,
        }
    }

    pub fn size(&self) -> usize {
        self.window.len()
    }

    /// Number of magnitude bins (size / 2 + 1)
    pub fn bins(&self) -> usize {
        self.spectrum.len()
    }

    /// Window `input` (zero-padded if short) and write |X[k]| into `out`
    pub fn magnitudes(&mut self, input: &[f32], out: &mut [f32]) -> Result<(), FftError> {
        let used = input.len().min(self.frame.len());
        for (i, slot) in self.frame.iter_mut().enumerate() {
            *slot = if i < used { input[i] * self.window[i] } else { 0.0 };
        }

        self.fft
            .process_with_scratch(&mut self.frame, &mut self.spectrum, &mut self.scratch)?;

        for (slot, bin) in out.iter_mut().zip(self.spectrum.iter()) {
            *slot = bin.norm();
        }
        Ok(())
    }
}
