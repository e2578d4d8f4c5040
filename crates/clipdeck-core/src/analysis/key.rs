//! Key estimation
//!
//! Builds a harmonically folded chromagram from averaged FFT magnitudes and
//! correlates every rotation against the Krumhansl-Schmuckler and
//! Temperley-Kostka-Payne major/minor profiles.

use crate::dsp::MagnitudeAnalyzer;
use crate::types::{AudioBuffer, Sample};

use super::bpm::pearson;
use super::music::{Mode, MusicalKey};

const FFT_SIZE: usize = 4096;
const HOP: usize = 2048;
const MAX_FRAMES: usize = 40;

const MIN_FREQ: f32 = 80.0;
const MAX_FREQ: f32 = 3000.0;
const HARMONICS: [usize; 3] = [2, 3, 4];

/// Chroma peaks below this are considered no signal
const MIN_CHROMA: f32 = 0.01;

const KS_MAJOR: [f32; 12] = [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];
const KS_MINOR: [f32; 12] = [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];
const TKP_MAJOR: [f32; 12] = [0.748, 0.060, 0.488, 0.082, 0.670, 0.460, 0.096, 0.715, 0.104, 0.366, 0.057, 0.400];
const TKP_MINOR: [f32; 12] = [0.712, 0.084, 0.474, 0.618, 0.049, 0.460, 0.105, 0.747, 0.404, 0.067, 0.133, 0.330];

/// Per-pitch-class emphasis (root, thirds and fifth slightly favoured)
const EMPHASIS: [f32; 12] = [1.05, 1.0, 1.0, 1.02, 1.02, 1.0, 1.0, 1.03, 1.0, 1.0, 1.0, 1.0];

/// A ranked key with its confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyCandidate {
    pub key: MusicalKey,
    pub confidence: f32,
}

/// Detected key with up to three alternatives, best first
#[derive(Debug, Clone, PartialEq)]
pub struct KeyResult {
    pub key: MusicalKey,
    /// 0.0 - 1.0
    pub confidence: f32,
    pub alternatives: Vec<KeyCandidate>,
}

impl KeyResult {
    /// Low-confidence C major returned when there is nothing to analyze
    pub fn fallback() -> Self {
        Self {
            key: MusicalKey::major(0),
            confidence: 0.1,
            alternatives: Vec::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.key.mode()
    }
}

/// Detect the key of `buffer`
///
/// Never fails: weak or empty input yields [`KeyResult::fallback`].
pub fn detect_key(buffer: &AudioBuffer) -> KeyResult {
    let mono = buffer.mono_mix();
    let Some(chroma) = chromagram(&mono, buffer.sample_rate() as f32) else {
        return KeyResult::fallback();
    };

    let mut scores: Vec<(MusicalKey, f32)> = (0..12u8)
        .flat_map(|root| {
            let rotated: [f32; 12] = std::array::from_fn(|i| chroma[(root as usize + i) % 12]);
            [
                (MusicalKey::major(root), profile_score(&rotated, &KS_MAJOR, &TKP_MAJOR)),
                (MusicalKey::minor(root), profile_score(&rotated, &KS_MINOR, &TKP_MINOR)),
            ]
        })
        .collect();
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (key, top) = scores[0];
    let second = scores[1].1;
    let third = scores[2].1;

    let margin = if top > 0.0 { (top - second) / top } else { 0.0 };
    let mut confidence = 0.6 * margin + 0.4 * top.max(0.0);
    if top > 0.7 {
        confidence *= 1.2;
    }
    if third > 0.9 * top {
        confidence *= 0.8;
    }
    let confidence = confidence.clamp(0.2, 1.0);

    let alternatives = scores[1..4]
        .iter()
        .map(|&(key, score)| KeyCandidate {
            key,
            confidence: if top > 0.0 { confidence * score.max(0.0) / top } else { 0.0 },
        })
        .collect();

    log::debug!("detect_key: {} (score {:.3}, runner-up {:.3}), confidence {:.2}", key, top, second, confidence);
    KeyResult {
        key,
        confidence,
        alternatives,
    }
}

/// Average of the two profile correlations
fn profile_score(rotated: &[f32; 12], ks: &[f32; 12], tkp: &[f32; 12]) -> f32 {
    (pearson(rotated, ks) + pearson(rotated, tkp)) / 2.0
}

/// Pitch class of a frequency (0 = C)
fn pitch_class(freq: f32) -> usize {
    let midi = 69.0 + 12.0 * (freq / 440.0).log2();
    (midi.round() as i64).rem_euclid(12) as usize
}

fn range_weight(freq: f32) -> f32 {
    if freq < 250.0 {
        1.5
    } else if freq < 1000.0 {
        1.2
    } else {
        0.8
    }
}

/// Normalized 12-bin chromagram, `None` when the signal is too weak
pub fn chromagram(mono: &[Sample], sample_rate: f32) -> Option<[f32; 12]> {
    if mono.is_empty() {
        return None;
    }
    let frames = if mono.len() >= FFT_SIZE {
        ((mono.len() - FFT_SIZE) / HOP + 1).min(MAX_FRAMES)
    } else {
        1
    };

    let mut analyzer = MagnitudeAnalyzer::new(FFT_SIZE);
    let mut magnitudes = vec![0.0; analyzer.bins()];
    let mut spectrum = vec![0.0f32; analyzer.bins()];
    let scale = 2.0 / FFT_SIZE as f32 / frames as f32;

    for frame in 0..frames {
        let start = frame * HOP;
        let end = (start + FFT_SIZE).min(mono.len());
        if let Err(e) = analyzer.magnitudes(&mono[start..end], &mut magnitudes) {
            log::warn!("detect_key: FFT failed ({}), returning default", e);
            return None;
        }
        for (acc, m) in spectrum.iter_mut().zip(&magnitudes) {
            *acc += m * scale;
        }
    }

    let mut chroma = [0.0f32; 12];
    let bin_hz = sample_rate / FFT_SIZE as f32;
    for (bin, &magnitude) in spectrum.iter().enumerate().skip(1) {
        let freq = bin as f32 * bin_hz;
        if !(MIN_FREQ..=MAX_FREQ).contains(&freq) {
            continue;
        }
        let weighted = magnitude * range_weight(freq);
        chroma[pitch_class(freq)] += weighted;

        // Overtones vote for their implied fundamental
        for harmonic in HARMONICS {
            let fundamental = freq / harmonic as f32;
            if fundamental < MIN_FREQ {
                break;
            }
            chroma[pitch_class(fundamental)] += weighted / harmonic as f32;
        }
    }

    for (value, emphasis) in chroma.iter_mut().zip(EMPHASIS) {
        *value *= emphasis;
    }

    let max = chroma.iter().copied().fold(0.0f32, f32::max);
    if max < MIN_CHROMA {
        log::debug!("detect_key: chroma peak {:.4} too weak", max);
        return None;
    }
    let sum: f32 = chroma.iter().sum();
    chroma.iter_mut().for_each(|v| *v /= sum);
    Some(chroma)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(freqs: &[f32], seconds: f32) -> AudioBuffer {
        let rate = 44100;
        let samples = (0..(seconds * rate as f32) as usize)
            .map(|i| {
                let t = i as f32 / rate as f32;
                freqs
                    .iter()
                    .map(|f| 0.25 * (2.0 * std::f32::consts::PI * f * t).sin())
                    .sum()
            })
            .collect();
        AudioBuffer::mono(rate, samples).unwrap()
    }

    #[test]
    fn test_c_major_triad() {
        let result = detect_key(&chord(&[261.63, 329.63, 392.0], 2.0));
        assert_eq!(result.key, MusicalKey::major(0));
        assert_eq!(result.key.root_name(), "C");
        assert_eq!(result.mode(), Mode::Major);
        assert!(result.confidence > 0.4, "confidence {}", result.confidence);
        assert_eq!(result.alternatives.len(), 3);
        assert!(result.alternatives.iter().all(|a| a.confidence <= result.confidence));
    }

    #[test]
    fn test_a_minor_and_g_major() {
        assert_eq!(detect_key(&chord(&[220.0, 261.63, 329.63], 2.0)).key, MusicalKey::minor(9));
        assert_eq!(detect_key(&chord(&[392.0, 493.88, 587.33], 2.0)).key, MusicalKey::major(7));
    }

    #[test]
    fn test_silence_returns_default() {
        let silent = AudioBuffer::silence(44100, 2, 44100).unwrap();
        assert_eq!(detect_key(&silent), KeyResult::fallback());

        let empty = AudioBuffer::mono(44100, vec![]).unwrap();
        assert_eq!(detect_key(&empty), KeyResult::fallback());
    }

    #[test]
    fn test_pitch_class_mapping() {
        assert_eq!(pitch_class(440.0), 9);
        assert_eq!(pitch_class(261.63), 0);
        assert_eq!(pitch_class(130.81), 0);
        assert_eq!(pitch_class(466.16), 10);
    }
}
