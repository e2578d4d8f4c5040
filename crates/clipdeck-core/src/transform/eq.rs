//! Offline three-band EQ

use rayon::prelude::*;

use crate::dsp::{BiquadCoeffs, BiquadState};
use crate::params::{EqBandKind, EqSettings};
use crate::types::AudioBuffer;

use super::error::TransformResult;

/// Coefficients for the three cascaded peaking filters
///
/// Always three stages: a disabled EQ yields 0 dB bands, which are identity
/// filters.
pub fn eq_coefficients(settings: &EqSettings, sample_rate: u32) -> [BiquadCoeffs; 3] {
    EqBandKind::ALL.map(|kind| {
        let band = settings.effective_band(kind);
        BiquadCoeffs::peaking(band.frequency, band.gain_db, band.q, sample_rate as f32)
    })
}

/// Run every channel through the low, mid and high peaking filters
pub fn apply_eq(buffer: &AudioBuffer, settings: &EqSettings) -> TransformResult<AudioBuffer> {
    let coeffs = eq_coefficients(settings, buffer.sample_rate());

    let channels = buffer
        .channels()
        .par_iter()
        .map(|channel| {
            let mut samples = channel.clone();
            for stage in &coeffs {
                BiquadState::default().process_block(&mut samples, stage);
            }
            samples
        })
        .collect();
    Ok(buffer.with_channels(channels)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::EqBand;

    fn sine(freq: f32, rate: u32, frames: usize) -> AudioBuffer {
        let samples = (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.25)
            .collect();
        AudioBuffer::mono(rate, samples).unwrap()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_disabled_eq_is_transparent() {
        let mut settings = EqSettings::default();
        settings.low.gain_db = 12.0;
        let buffer = sine(100.0, 48000, 4800);
        for stage in eq_coefficients(&settings, 48000) {
            // Numerator equals denominator
            assert_eq!(stage.b0, 1.0);
            assert_eq!(stage.b1, stage.a1);
            assert_eq!(stage.b2, stage.a2);
        }
        let out = apply_eq(&buffer, &settings).unwrap();
        for (a, b) in out.channel(0).iter().zip(buffer.channel(0)) {
            // Three cascaded stages accumulate rounding
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_mid_boost_raises_level() {
        let settings = EqSettings {
            enabled: true,
            mid: EqBand::new(1000.0, 1.0, 6.0),
            ..EqSettings::default()
        };
        let buffer = sine(1000.0, 48000, 48000);
        let out = apply_eq(&buffer, &settings).unwrap();

        // Skip the filter's settling time
        let gain = rms(&out.channel(0)[4800..]) / rms(&buffer.channel(0)[4800..]);
        let gain_db = 20.0 * gain.log10();
        assert!((gain_db - 6.0).abs() < 0.2, "gain {} dB", gain_db);
    }

    #[test]
    fn test_out_of_range_band_is_clamped() {
        let settings = EqSettings {
            enabled: true,
            low: EqBand::new(5000.0, 1.0, -12.0),
            ..EqSettings::default()
        };
        let coeffs = eq_coefficients(&settings, 48000);
        // Clamped to 400Hz
        let at_400 = 20.0 * coeffs[0].magnitude_at(400.0, 48000.0).log10();
        assert!((at_400 + 12.0).abs() < 0.05);
    }
}
