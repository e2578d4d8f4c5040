//! Offline noise gate

use crate::dsp::GateProcessor;
use crate::params::threshold_for_sensitivity;
use crate::types::AudioBuffer;

use super::error::{check_unit, TransformResult};

/// Gate `buffer` keyed off its first channel
///
/// The gain curve is computed once from channel 0 and applied identically to
/// every channel so the stereo image does not shift.
pub fn apply_noise_gate_offline(
    buffer: &AudioBuffer,
    sensitivity: f32,
    amount: f32,
) -> TransformResult<AudioBuffer> {
    let sensitivity = check_unit("sensitivity", sensitivity)?;
    let amount = check_unit("amount", amount)?;

    let mut gate = GateProcessor::new(
        buffer.sample_rate() as f32,
        threshold_for_sensitivity(sensitivity),
        1.0 - amount,
    );
    let gains: Vec<f32> = buffer.channel(0).iter().map(|&s| gate.next_gain(s)).collect();

    let channels = buffer
        .channels()
        .iter()
        .map(|channel| channel.iter().zip(&gains).map(|(s, g)| s * g).collect())
        .collect();
    Ok(buffer.with_channels(channels)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformError;

    const RATE: u32 = 48000;

    /// Low noise floor with a 50ms 440Hz burst at 0.5s, 2s total
    fn floor_with_burst() -> AudioBuffer {
        let mut seed = 0x1234_5678u32;
        let samples = (0..RATE as usize * 2)
            .map(|i| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let noise = (seed >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0;
                let t = i as f32 / RATE as f32;
                let burst = if (0.5..0.55).contains(&t) {
                    (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.8
                } else {
                    0.0
                };
                noise * 0.003 + burst
            })
            .collect();
        AudioBuffer::mono(RATE, samples).unwrap()
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0, |acc, s| acc.max(s.abs()))
    }

    #[test]
    fn test_gate_silences_floor_and_keeps_transient() {
        let buffer = floor_with_burst();
        let gated = apply_noise_gate_offline(&buffer, 0.5, 1.0).unwrap();
        let out = gated.channel(0);
        let input = buffer.channel(0);

        let before = RATE as usize / 2;
        assert_eq!(peak(&out[..before]), 0.0);

        let burst = before..before + RATE as usize / 20;
        assert!(peak(&out[burst.clone()]) >= 0.9 * peak(&input[burst]));

        let tail = RATE as usize * 17 / 10..;
        assert!(peak(&out[tail]) < 1e-4);
    }

    #[test]
    fn test_partial_amount_leaves_floor() {
        let buffer = floor_with_burst();
        let gated = apply_noise_gate_offline(&buffer, 0.5, 0.5).unwrap();
        let ratio = peak(&gated.channel(0)[..1000]) / peak(&buffer.channel(0)[..1000]);
        assert!((ratio - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_stereo_shares_gain() {
        let left = vec![0.5f32; 4800];
        let right = vec![0.25f32; 4800];
        let buffer = AudioBuffer::new(RATE, vec![left, right]).unwrap();
        let gated = apply_noise_gate_offline(&buffer, 0.5, 1.0).unwrap();
        for i in [0, 10, 100, 4799] {
            assert!((gated.channel(0)[i] - 2.0 * gated.channel(1)[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_parameters_validated() {
        let buffer = floor_with_burst();
        assert!(matches!(
            apply_noise_gate_offline(&buffer, 1.5, 1.0),
            Err(TransformError::InvalidParameter { name: "sensitivity", .. })
        ));
        assert!(matches!(
            apply_noise_gate_offline(&buffer, 0.5, f32::NAN),
            Err(TransformError::InvalidParameter { name: "amount", .. })
        ));
    }
}
