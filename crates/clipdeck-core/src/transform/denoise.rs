//! Noise reduction
//!
//! An external [`NoiseModel`] gets the first attempt when one is supplied. If
//! it is missing, fails, or returns a buffer of the wrong shape, the built-in
//! spectral gate runs instead.
//!
//! Spectral gating: STFT (2048 / hop 1024, sqrt-Hann analysis and synthesis),
//! a per-bin noise floor averaged over the quietest 10% of frames, and bins
//! under `floor * (1.5 + 2 * strength)` pulled down to `1 - strength`.

use std::sync::Arc;

use rayon::prelude::*;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::dsp::hann_window;
use crate::types::{AudioBuffer, Sample};

use super::error::{check_unit, TransformResult};

const FFT_SIZE: usize = 2048;
const HOP: usize = FFT_SIZE / 2;

/// Fraction of frames used to estimate the noise floor
const NOISE_FRAME_FRACTION: f32 = 0.1;

/// Per-bin gain smoothing between consecutive frames
const GAIN_SMOOTHING: f32 = 0.5;

/// An advanced denoiser provided from outside the core
pub trait NoiseModel: Send + Sync {
    fn name(&self) -> &str;

    /// Denoise `buffer`; `strength` is 0.0 - 1.0
    fn denoise(&self, buffer: &AudioBuffer, strength: f32) -> Result<AudioBuffer, String>;
}

/// Reduce noise with `model` if given, falling back to spectral gating
pub fn reduce_noise(
    buffer: &AudioBuffer,
    strength: f32,
    model: Option<&dyn NoiseModel>,
) -> TransformResult<AudioBuffer> {
    let strength = check_unit("strength", strength)?;

    if let Some(model) = model {
        match model.denoise(buffer, strength) {
            Ok(out)
                if out.len() == buffer.len()
                    && out.channel_count() == buffer.channel_count()
                    && out.sample_rate() == buffer.sample_rate() =>
            {
                log::debug!("reduce_noise: used model '{}'", model.name());
                return Ok(out);
            }
            Ok(_) => log::warn!(
                "reduce_noise: model '{}' changed the buffer shape, falling back to spectral gating",
                model.name()
            ),
            Err(e) => log::warn!(
                "reduce_noise: model '{}' failed ({}), falling back to spectral gating",
                model.name(),
                e
            ),
        }
    }

    spectral_gate(buffer, strength)
}

/// Built-in spectral gate
pub fn spectral_gate(buffer: &AudioBuffer, strength: f32) -> TransformResult<AudioBuffer> {
    let strength = check_unit("strength", strength)?;
    if buffer.is_empty() || strength == 0.0 {
        return Ok(buffer.clone());
    }

    let channels = buffer
        .channels()
        .par_iter()
        .map(|channel| SpectralGate::new(strength).process(channel))
        .collect();
    Ok(buffer.with_channels(channels)?)
}

struct SpectralGate {
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    window: Vec<f32>,
    strength: f32,
}

impl SpectralGate {
    fn new(strength: f32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        Self {
            forward: planner.plan_fft_forward(FFT_SIZE),
            inverse: planner.plan_fft_inverse(FFT_SIZE),
            window: hann_window(FFT_SIZE).into_iter().map(f32::sqrt).collect(),
            strength,
        }
    }

    fn process(&self, samples: &[Sample]) -> Vec<Sample> {
        let len = samples.len();
        let frame_count = (len + FFT_SIZE) / HOP + 1;

        // FFT_SIZE of silence in front so every sample is covered by two frames
        let mut padded = vec![0.0; (frame_count - 1) * HOP + FFT_SIZE];
        padded[FFT_SIZE..FFT_SIZE + len].copy_from_slice(samples);

        let spectra = self.analyze(&padded, frame_count);
        let floor = self.noise_floor(&spectra, len);
        let Some(floor) = floor else {
            return samples.to_vec();
        };

        let threshold = 1.5 + 2.0 * self.strength;
        let closed = 1.0 - self.strength;
        let mut gains = vec![1.0f32; floor.len()];
        let mut output = vec![0.0f32; padded.len()];
        let mut scratch = self.inverse.make_scratch_vec();
        let mut frame = vec![0.0f32; FFT_SIZE];

        for (index, mut spectrum) in spectra.into_iter().enumerate() {
            for ((bin, gain), &noise) in spectrum.iter_mut().zip(gains.iter_mut()).zip(&floor) {
                let target = if bin.norm() < noise * threshold { closed } else { 1.0 };
                *gain = GAIN_SMOOTHING * *gain + (1.0 - GAIN_SMOOTHING) * target;
                *bin *= *gain;
            }
            if let Some(first) = spectrum.first_mut() {
                first.im = 0.0;
            }
            if let Some(last) = spectrum.last_mut() {
                last.im = 0.0;
            }

            if let Err(e) = self
                .inverse
                .process_with_scratch(&mut spectrum, &mut frame, &mut scratch)
            {
                log::warn!("spectral_gate: inverse FFT failed on frame {}: {}", index, e);
                continue;
            }

            let start = index * HOP;
            for (i, &s) in frame.iter().enumerate() {
                output[start + i] += s * self.window[i] / FFT_SIZE as f32;
            }
        }

        output[FFT_SIZE..FFT_SIZE + len].to_vec()
    }

    fn analyze(&self, padded: &[f32], frame_count: usize) -> Vec<Vec<Complex<f32>>> {
        (0..frame_count)
            .into_par_iter()
            .map(|index| {
                let start = index * HOP;
                let mut frame: Vec<f32> = padded[start..start + FFT_SIZE]
                    .iter()
                    .zip(&self.window)
                    .map(|(s, w)| s * w)
                    .collect();
                let mut spectrum = self.forward.make_output_vec();
                let mut scratch = self.forward.make_scratch_vec();
                if let Err(e) = self
                    .forward
                    .process_with_scratch(&mut frame, &mut spectrum, &mut scratch)
                {
                    log::warn!("spectral_gate: forward FFT failed on frame {}: {}", index, e);
                }
                spectrum
            })
            .collect()
    }

    /// Mean magnitude per bin over the quietest frames
    ///
    /// Prefers frames that lie fully inside the signal so the zero padding
    /// does not drag the floor down. `None` for pure silence.
    fn noise_floor(&self, spectra: &[Vec<Complex<f32>>], len: usize) -> Option<Vec<f32>> {
        let energy = |spectrum: &Vec<Complex<f32>>| spectrum.iter().map(|c| c.norm_sqr()).sum::<f32>();

        let inside: Vec<usize> = (0..spectra.len())
            .filter(|&i| i * HOP >= FFT_SIZE && i * HOP + FFT_SIZE <= FFT_SIZE + len)
            .collect();
        let candidates: Vec<usize> = if inside.is_empty() {
            (0..spectra.len()).collect()
        } else {
            inside
        };

        let mut ranked: Vec<(usize, f32)> = candidates
            .into_iter()
            .map(|i| (i, energy(&spectra[i])))
            .filter(|&(_, e)| e > 0.0)
            .collect();
        if ranked.is_empty() {
            return None;
        }
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        let take = ((ranked.len() as f32 * NOISE_FRAME_FRACTION).ceil() as usize).max(1);
        let bins = spectra[0].len();
        let mut floor = vec![0.0f32; bins];
        for &(i, _) in ranked.iter().take(take) {
            for (acc, bin) in floor.iter_mut().zip(&spectra[i]) {
                *acc += bin.norm();
            }
        }
        for value in &mut floor {
            *value /= take as f32;
        }
        Some(floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformError;

    const RATE: u32 = 44100;

    /// 0.5s of noise, then 2s of a 440Hz tone over the same noise
    fn noisy_tone() -> AudioBuffer {
        let mut seed = 0xDEAD_BEEFu32;
        let samples = (0..RATE as usize * 5 / 2)
            .map(|i| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let noise = ((seed >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0) * 0.01;
                let t = i as f32 / RATE as f32;
                let tone = if t >= 0.5 {
                    (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
                } else {
                    0.0
                };
                tone + noise
            })
            .collect();
        AudioBuffer::mono(RATE, samples).unwrap()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn secs(t: f32) -> usize {
        (t * RATE as f32) as usize
    }

    struct FailingModel;

    impl NoiseModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        fn denoise(&self, _buffer: &AudioBuffer, _strength: f32) -> Result<AudioBuffer, String> {
            Err("model unavailable".to_string())
        }
    }

    struct SilencingModel;

    impl NoiseModel for SilencingModel {
        fn name(&self) -> &str {
            "silencing"
        }

        fn denoise(&self, buffer: &AudioBuffer, _strength: f32) -> Result<AudioBuffer, String> {
            AudioBuffer::silence(buffer.sample_rate(), buffer.channel_count(), buffer.len())
                .map_err(|e| e.to_string())
        }
    }

    #[test]
    fn test_noise_is_reduced_and_tone_kept() {
        let buffer = noisy_tone();
        let cleaned = spectral_gate(&buffer, 1.0).unwrap();
        assert_eq!(cleaned.len(), buffer.len());

        let noise_in = rms(&buffer.channel(0)[secs(0.1)..secs(0.4)]);
        let noise_out = rms(&cleaned.channel(0)[secs(0.1)..secs(0.4)]);
        assert!(noise_out < noise_in * 0.5, "noise {} -> {}", noise_in, noise_out);

        let tone_in = rms(&buffer.channel(0)[secs(1.0)..secs(2.0)]);
        let tone_out = rms(&cleaned.channel(0)[secs(1.0)..secs(2.0)]);
        assert!((tone_out / tone_in - 1.0).abs() < 0.1, "tone {} -> {}", tone_in, tone_out);
    }

    #[test]
    fn test_zero_strength_and_silence_pass_through() {
        let buffer = noisy_tone();
        assert_eq!(spectral_gate(&buffer, 0.0).unwrap(), buffer);

        let silent = AudioBuffer::silence(RATE, 2, 5000).unwrap();
        assert_eq!(spectral_gate(&silent, 0.8).unwrap(), silent);
    }

    #[test]
    fn test_failing_model_falls_back() {
        let buffer = noisy_tone();
        let fallback = reduce_noise(&buffer, 1.0, Some(&FailingModel)).unwrap();
        assert_eq!(fallback, spectral_gate(&buffer, 1.0).unwrap());
    }

    #[test]
    fn test_model_result_is_used() {
        let buffer = noisy_tone();
        let out = reduce_noise(&buffer, 0.5, Some(&SilencingModel)).unwrap();
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_strength_validated() {
        let buffer = noisy_tone();
        assert!(matches!(
            reduce_noise(&buffer, 1.2, None),
            Err(TransformError::InvalidParameter { name: "strength", .. })
        ));
    }
}
