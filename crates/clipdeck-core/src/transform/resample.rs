//! Band-limited sample rate conversion
//!
//! Each channel runs through its own rubato sinc resampler as one fixed chunk.
//! The input is framed by silence: a lead-in so the kernel never starts inside
//! the signal, and a tail so the filter is flushed. Where the first input frame
//! lands in the output is measured once per conversion by running a unit
//! impulse through an identical resampler, which leaves exactly
//! `round(len * target / source)` frames aligned with the input.

use rayon::prelude::*;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::types::{AudioBuffer, Sample};

use super::error::{TransformError, TransformResult};

const SINC_LEN: usize = 256;

/// Silence ahead of the signal, in input frames
const LEAD_IN: usize = SINC_LEN;

/// Silence after the signal, in input frames
const TAIL: usize = 2 * SINC_LEN;

fn sinc_params() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Output length for a conversion between two rates
pub fn resampled_len(len: usize, source_rate: u32, target_rate: u32) -> usize {
    (len as f64 * target_rate as f64 / source_rate as f64).round() as usize
}

/// Convert `buffer` to `target_rate`
///
/// Returns a copy when the rates already match.
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> TransformResult<AudioBuffer> {
    if target_rate == 0 {
        return Err(TransformError::InvalidSampleRate(target_rate));
    }
    let source_rate = buffer.sample_rate();
    if source_rate == target_rate {
        return Ok(buffer.clone());
    }
    if buffer.is_empty() {
        return Ok(AudioBuffer::silence(target_rate, buffer.channel_count(), 0)?);
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let target_len = resampled_len(buffer.len(), source_rate, target_rate);
    let skip = signal_start(ratio)?;
    log::debug!(
        "resample: {}Hz -> {}Hz, {} -> {} frames, signal starts at output frame {}",
        source_rate,
        target_rate,
        buffer.len(),
        target_len,
        skip
    );

    let channels = buffer
        .channels()
        .par_iter()
        .map(|channel| resample_channel(channel, ratio, skip, target_len))
        .collect::<TransformResult<Vec<_>>>()?;

    Ok(AudioBuffer::new(target_rate, channels)?)
}

/// Run one framed channel through a fresh resampler as a single chunk
fn run_sinc(input: Vec<Sample>, ratio: f64) -> TransformResult<Vec<Sample>> {
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, sinc_params(), input.len(), 1)
        .map_err(|e| TransformError::Resample(e.to_string()))?;
    let waves_out = resampler
        .process(&[input], None)
        .map_err(|e| TransformError::Resample(e.to_string()))?;
    Ok(waves_out.into_iter().next().unwrap_or_default())
}

/// Output frame where input frame `LEAD_IN` lands
///
/// The impulse response peak is refined with a parabola through its
/// neighbours, then rounded to the nearest output frame.
fn signal_start(ratio: f64) -> TransformResult<usize> {
    let mut impulse = vec![0.0; LEAD_IN + 1 + TAIL];
    impulse[LEAD_IN] = 1.0;
    let response = run_sinc(impulse, ratio)?;

    let (peak, _) = response
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(|| TransformError::Resample("resampler produced no output".to_string()))?;

    let offset = match (peak.checked_sub(1), response.get(peak + 1)) {
        (Some(before), Some(&right)) => {
            let (left, center) = (response[before], response[peak]);
            let curvature = left - 2.0 * center + right;
            if curvature.abs() > f32::EPSILON {
                (0.5 * (left - right) / curvature).clamp(-0.5, 0.5)
            } else {
                0.0
            }
        }
        _ => 0.0,
    };
    Ok((peak as f64 + offset as f64).round().max(0.0) as usize)
}

fn resample_channel(
    samples: &[Sample],
    ratio: f64,
    skip: usize,
    target_len: usize,
) -> TransformResult<Vec<Sample>> {
    let mut framed = Vec::with_capacity(LEAD_IN + samples.len() + TAIL);
    framed.resize(LEAD_IN, 0.0);
    framed.extend_from_slice(samples);
    framed.resize(LEAD_IN + samples.len() + TAIL, 0.0);

    let mut out: Vec<Sample> = run_sinc(framed, ratio)?
        .into_iter()
        .skip(skip)
        .take(target_len)
        .collect();
    out.resize(target_len, 0.0);
    Ok(out)
}
