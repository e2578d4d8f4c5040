//! Duration changes
//!
//! [`time_stretch`] is varispeed: it replays the buffer at `1 / ratio` speed
//! with linear interpolation, so pitch moves with duration.
//! [`time_stretch_preserving_pitch`] runs the same length contract through
//! signalsmith-stretch and keeps pitch fixed.

use signalsmith_stretch::Stretch;

use crate::types::{AudioBuffer, Sample};

use super::error::{TransformError, TransformResult};

/// Longest stretch output, about 93 minutes at 48kHz
pub const MAX_STRETCHED_FRAMES: usize = 1 << 28;

fn check_ratio(buffer: &AudioBuffer, ratio: f64) -> TransformResult<usize> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(TransformError::InvalidRatio(ratio));
    }
    if buffer.is_empty() {
        return Err(TransformError::EmptyBuffer);
    }
    if (buffer.len() as f64 * ratio).round() > MAX_STRETCHED_FRAMES as f64 {
        return Err(TransformError::InvalidRatio(ratio));
    }
    Ok(stretched_len(buffer.len(), ratio))
}

/// Output length for a stretch by `ratio`
pub fn stretched_len(len: usize, ratio: f64) -> usize {
    (len as f64 * ratio).round() as usize
}

/// Change duration by `ratio` (2.0 = twice as long), shifting pitch with it
pub fn time_stretch(buffer: &AudioBuffer, ratio: f64) -> TransformResult<AudioBuffer> {
    let out_len = check_ratio(buffer, ratio)?;
    let step = 1.0 / ratio;

    let channels = buffer
        .channels()
        .iter()
        .map(|channel| varispeed(channel, step, out_len))
        .collect();
    Ok(buffer.with_channels(channels)?)
}

fn varispeed(samples: &[Sample], step: f64, out_len: usize) -> Vec<Sample> {
    let last = samples.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let index = pos.floor() as usize;
            if index >= last {
                return samples[last];
            }
            let frac = (pos - index as f64) as Sample;
            samples[index] + (samples[index + 1] - samples[index]) * frac
        })
        .collect()
}

/// Change duration by `ratio` without changing pitch
///
/// The stretcher delays its output by its input latency (scaled by the ratio)
/// plus its output latency. The input is padded so that delay can be flushed
/// out and dropped from the front.
pub fn time_stretch_preserving_pitch(buffer: &AudioBuffer, ratio: f64) -> TransformResult<AudioBuffer> {
    let out_len = check_ratio(buffer, ratio)?;
    let channel_count = buffer.channel_count();

    let mut stretch = Stretch::preset_default(channel_count as u32, buffer.sample_rate());
    let input_latency = stretch.input_latency();
    let output_latency = stretch.output_latency();
    let delay = stretched_len(input_latency, ratio) + output_latency;

    let mut input = buffer.to_interleaved();
    input.resize((buffer.len() + input_latency) * channel_count, 0.0);
    let process_len = stretched_len(buffer.len() + input_latency, ratio);

    let mut output = vec![0.0; (process_len + output_latency) * channel_count];
    let (body, tail) = output.split_at_mut(process_len * channel_count);
    stretch.process(&input[..], &mut body[..]);
    stretch.flush(&mut tail[..]);

    log::debug!(
        "time_stretch_preserving_pitch: ratio {:.3}, {} -> {} frames, latency {}+{}",
        ratio,
        buffer.len(),
        out_len,
        input_latency,
        output_latency
    );

    let mut channels = vec![Vec::with_capacity(out_len); channel_count];
    for frame in output.chunks_exact(channel_count).skip(delay).take(out_len) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }
    for channel in &mut channels {
        channel.resize(out_len, 0.0);
    }
    Ok(buffer.with_channels(channels)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, frames: usize) -> AudioBuffer {
        let samples: Vec<f32> = (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        AudioBuffer::new(44100, vec![samples.clone(), samples]).unwrap()
    }

    #[test]
    fn test_double_length() {
        let buffer = sine(220.0, 1001);
        let stretched = time_stretch(&buffer, 2.0).unwrap();
        assert_eq!(stretched.len(), 2002);
        assert_eq!(stretched.channel_count(), 2);
        // Even output frames land exactly on input frames
        assert_eq!(stretched.channel(0)[200], buffer.channel(0)[100]);
    }

    #[test]
    fn test_unit_ratio_keeps_length() {
        let buffer = sine(220.0, 777);
        let stretched = time_stretch(&buffer, 1.0).unwrap();
        assert_eq!(stretched, buffer);
    }

    #[test]
    fn test_rounding_of_output_length() {
        let buffer = sine(220.0, 3);
        assert_eq!(time_stretch(&buffer, 0.5).unwrap().len(), 2);
        assert_eq!(stretched_len(10, 1.26), 13);
    }

    #[test]
    fn test_invalid_ratios() {
        let buffer = sine(220.0, 100);
        for ratio in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(time_stretch(&buffer, ratio), Err(TransformError::InvalidRatio(_))));
        }
        // Output would not fit in memory
        for ratio in [1e12, f64::MAX] {
            assert_eq!(time_stretch(&buffer, ratio), Err(TransformError::InvalidRatio(ratio)));
            assert_eq!(
                time_stretch_preserving_pitch(&buffer, ratio),
                Err(TransformError::InvalidRatio(ratio))
            );
        }
        let empty = AudioBuffer::mono(44100, vec![]).unwrap();
        assert_eq!(time_stretch(&empty, 2.0), Err(TransformError::EmptyBuffer));
    }

    #[test]
    fn test_pitch_preserving_length_contract() {
        let buffer = sine(440.0, 22050);
        let longer = time_stretch_preserving_pitch(&buffer, 2.0).unwrap();
        assert_eq!(longer.len(), 44100);
        assert_eq!(longer.channel_count(), 2);

        let shorter = time_stretch_preserving_pitch(&buffer, 0.75).unwrap();
        assert_eq!(shorter.len(), stretched_len(22050, 0.75));

        // Sound comes out, not just padding
        let mid_peak = longer.channel(0)[10000..30000]
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(mid_peak > 0.1);
    }
}
