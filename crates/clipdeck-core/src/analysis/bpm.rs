//! Tempo estimation
//!
//! Onset strength from spectral flux (falls back to an energy derivative),
//! then every integer BPM in [60, 200] is scored by autocorrelation of the
//! onset function at the beat period plus a comb over its 1x/2x/3x multiples.

use serde::{Deserialize, Serialize};

use crate::dsp::MagnitudeAnalyzer;
use crate::types::{AudioBuffer, Sample};

const FFT_SIZE: usize = 2048;
const HOP: usize = 512;
const MAX_FLUX_FRAMES: usize = 200;

/// Energy fallback framing
const ENERGY_FRAME_SECONDS: f32 = 0.023;
const MAX_ENERGY_FRAMES: usize = 400;

/// Onset functions shorter than this are treated as unusable
const MIN_ONSET_FRAMES: usize = 32;

/// Minimum overlap when correlating the onset function with itself
const MIN_OVERLAP: usize = 16;

const MIN_CANDIDATE_BPM: u32 = 60;
const MAX_CANDIDATE_BPM: u32 = 200;

const AUTOCORR_WEIGHT: f32 = 0.6;
const COMB_WEIGHT: f32 = 0.4;
const OCTAVE_BONUS: f32 = 0.1;
const OCTAVE_BONUS_THRESHOLD: f32 = 0.5;
const MIN_SCORE: f32 = 0.1;

/// Runner-up candidates must be this far from the winner (and each other)
const CANDIDATE_SEPARATION_BPM: u32 = 5;

/// Detected tempo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BpmResult {
    pub bpm: f32,
    /// 0.0 - 1.0
    pub confidence: f32,
}

/// Accepted tempo range for octave folding
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BpmRange {
    pub min: f32,
    pub max: f32,
}

impl Default for BpmRange {
    fn default() -> Self {
        Self {
            min: MIN_CANDIDATE_BPM as f32,
            max: MAX_CANDIDATE_BPM as f32,
        }
    }
}

impl BpmRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Double or halve `bpm` until it lands in the range
    pub fn fold(&self, bpm: f32) -> Option<f32> {
        if !(self.min > 0.0 && self.min <= self.max && bpm > 0.0 && bpm.is_finite()) {
            return None;
        }
        let mut folded = bpm;
        while folded < self.min {
            folded *= 2.0;
        }
        while folded > self.max {
            folded /= 2.0;
        }
        (folded >= self.min).then_some(folded)
    }
}

/// Detect the tempo of `buffer`
///
/// Returns `None` for clips shorter than two seconds, silence, or when no
/// candidate scores well enough to be trusted.
pub fn detect_bpm(buffer: &AudioBuffer) -> Option<BpmResult> {
    let sample_rate = buffer.sample_rate() as usize;
    if buffer.len() < 2 * sample_rate {
        log::debug!("detect_bpm: {:.2}s is too short", buffer.duration_seconds());
        return None;
    }

    let mut mono = buffer.mono_mix();
    let peak = mono.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak == 0.0 || !peak.is_finite() {
        return None;
    }
    if peak < 1.0 {
        mono.iter_mut().for_each(|s| *s /= peak);
    }

    let (onset, onset_rate) = onset_function(&mono, buffer.sample_rate() as f32);
    let onset = smooth(&onset);
    let scores = score_candidates(&onset, onset_rate)?;
    pick_tempo(&scores)
}

/// Detect the tempo and fold it by octaves into `range`
pub fn detect_bpm_with_options(buffer: &AudioBuffer, range: BpmRange) -> Option<BpmResult> {
    let raw = detect_bpm(buffer)?;
    let bpm = range.fold(raw.bpm)?;
    if bpm != raw.bpm {
        log::debug!("detect_bpm: folded {} -> {} for range {}-{}", raw.bpm, bpm, range.min, range.max);
    }
    Some(BpmResult { bpm, ..raw })
}

// ─────────────────────────────────────────────────────────────────────────────
// Onset detection
// ─────────────────────────────────────────────────────────────────────────────

/// Onset function and its frame rate in Hz
fn onset_function(mono: &[Sample], sample_rate: f32) -> (Vec<f32>, f32) {
    match spectral_flux(mono) {
        Ok(flux) if is_usable(&flux) => return (flux, sample_rate / HOP as f32),
        Ok(flux) => log::debug!("detect_bpm: spectral flux degenerate ({} frames), using energy", flux.len()),
        Err(e) => log::warn!("detect_bpm: spectral flux failed ({}), using energy", e),
    }
    energy_derivative(mono, sample_rate)
}

fn is_usable(onset: &[f32]) -> bool {
    if onset.len() < MIN_ONSET_FRAMES {
        return false;
    }
    let n = onset.len() as f32;
    let mean = onset.iter().sum::<f32>() / n;
    let variance = onset.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    variance > 0.0 && variance > mean * mean * 1e-9
}

/// Sum of positive magnitude increases between consecutive frames
fn spectral_flux(mono: &[Sample]) -> Result<Vec<f32>, realfft::FftError> {
    if mono.len() < FFT_SIZE {
        return Ok(Vec::new());
    }
    let frames = ((mono.len() - FFT_SIZE) / HOP + 1).min(MAX_FLUX_FRAMES);

    let mut analyzer = MagnitudeAnalyzer::new(FFT_SIZE);
    let mut previous = vec![0.0; analyzer.bins()];
    let mut current = vec![0.0; analyzer.bins()];
    let mut flux = Vec::with_capacity(frames.saturating_sub(1));

    for frame in 0..frames {
        let start = frame * HOP;
        analyzer.magnitudes(&mono[start..start + FFT_SIZE], &mut current)?;
        if frame > 0 {
            flux.push(
                current
                    .iter()
                    .zip(&previous)
                    .map(|(c, p)| (c - p).max(0.0))
                    .sum(),
            );
        }
        std::mem::swap(&mut previous, &mut current);
    }
    Ok(flux)
}

/// Positive frame-to-frame energy change
fn energy_derivative(mono: &[Sample], sample_rate: f32) -> (Vec<f32>, f32) {
    let frame_len = ((sample_rate * ENERGY_FRAME_SECONDS).round() as usize).max(4);
    let hop = frame_len / 4;
    let frames = if mono.len() >= frame_len {
        ((mono.len() - frame_len) / hop + 1).min(MAX_ENERGY_FRAMES)
    } else {
        0
    };

    let energy: Vec<f32> = (0..frames)
        .map(|f| {
            let window = &mono[f * hop..f * hop + frame_len];
            window.iter().map(|s| s * s).sum::<f32>() / frame_len as f32
        })
        .collect();
    let derivative = energy.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect();
    (derivative, sample_rate / hop as f32)
}

/// 3-tap [1/4, 1/2, 1/4] smoothing with edge replication
fn smooth(onset: &[f32]) -> Vec<f32> {
    let n = onset.len();
    (0..n)
        .map(|i| {
            let left = onset[i.saturating_sub(1)];
            let right = onset[(i + 1).min(n - 1)];
            0.25 * left + 0.5 * onset[i] + 0.25 * right
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Candidate scoring
// ─────────────────────────────────────────────────────────────────────────────

/// Pearson correlation of two equally long slices (0 when either is flat)
pub(crate) fn pearson(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mean_a = a[..n].iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().map(|&v| v as f64).sum::<f64>() / n as f64;

    let (mut num, mut den_a, mut den_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a[..n].iter().zip(&b[..n]) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        num += dx * dy;
        den_a += dx * dx;
        den_b += dy * dy;
    }
    if den_a < 1e-24 || den_b < 1e-24 {
        return 0.0;
    }
    (num / (den_a * den_b).sqrt()) as f32
}

/// Normalized autocorrelation at integer lags, index = lag
struct Autocorrelation {
    values: Vec<f32>,
}

impl Autocorrelation {
    fn new(onset: &[f32]) -> Option<Self> {
        let max_lag = onset.len().checked_sub(MIN_OVERLAP)?;
        let mut values = vec![0.0; max_lag + 1];
        for (lag, value) in values.iter_mut().enumerate().skip(1) {
            *value = pearson(&onset[..onset.len() - lag], &onset[lag..]);
        }
        Some(Self { values })
    }

    fn max_lag(&self) -> usize {
        self.values.len() - 1
    }

    /// Linearly interpolated at a fractional lag; 0 outside the valid range
    fn at(&self, lag: f32) -> f32 {
        if lag < 1.0 || lag > self.max_lag() as f32 {
            return 0.0;
        }
        let index = lag.floor() as usize;
        let frac = lag - index as f32;
        if index + 1 > self.max_lag() {
            return self.values[index];
        }
        self.values[index] * (1.0 - frac) + self.values[index + 1] * frac
    }
}

/// Combined score for every integer BPM candidate
fn score_candidates(onset: &[f32], onset_rate: f32) -> Option<Vec<(u32, f32)>> {
    let ac = Autocorrelation::new(onset)?;

    let scores = (MIN_CANDIDATE_BPM..=MAX_CANDIDATE_BPM)
        .map(|bpm| {
            let lag = 60.0 * onset_rate / bpm as f32;
            let direct = ac.at(lag).max(0.0);
            let comb = (1..=3).map(|m| ac.at(lag * m as f32).max(0.0)).sum::<f32>() / 3.0;
            (bpm, AUTOCORR_WEIGHT * direct + COMB_WEIGHT * comb)
        })
        .collect();
    Some(scores)
}

fn score_of(scores: &[(u32, f32)], bpm: u32) -> Option<f32> {
    scores.iter().find(|(b, _)| *b == bpm).map(|&(_, s)| s)
}

/// Local maxima of the score curve, best first
fn local_peaks(scores: &[(u32, f32)]) -> Vec<(u32, f32)> {
    let mut peaks: Vec<(u32, f32)> = scores
        .iter()
        .enumerate()
        .filter(|&(i, &(_, s))| {
            let left_ok = i == 0 || s >= scores[i - 1].1;
            let right_ok = i + 1 == scores.len() || s >= scores[i + 1].1;
            left_ok && right_ok
        })
        .map(|(_, &candidate)| candidate)
        .collect();
    peaks.sort_by(|a, b| b.1.total_cmp(&a.1));
    peaks
}

fn pick_tempo(scores: &[(u32, f32)]) -> Option<BpmResult> {
    let &(best, top) = scores.iter().max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))?;
    if top < MIN_SCORE {
        log::debug!("detect_bpm: best score {:.3} at {} BPM is too weak", top, best);
        return None;
    }

    let half = (best % 2 == 0).then(|| best / 2);
    let bonus = [half, Some(best * 2)]
        .into_iter()
        .flatten()
        .filter_map(|related| score_of(scores, related))
        .filter(|&s| s > OCTAVE_BONUS_THRESHOLD)
        .count() as f32
        * OCTAVE_BONUS;
    let boosted = top + bonus;

    let peaks: Vec<(u32, f32)> = local_peaks(scores)
        .into_iter()
        .filter(|&(bpm, _)| bpm.abs_diff(best) > CANDIDATE_SEPARATION_BPM)
        .collect();
    let second = peaks.first().copied();
    let third = second.and_then(|(second_bpm, _)| {
        peaks
            .iter()
            .skip(1)
            .find(|&&(bpm, _)| bpm.abs_diff(second_bpm) > CANDIDATE_SEPARATION_BPM)
            .copied()
    });
    let second_score = second.map_or(0.0, |(_, s)| s);
    let third_score = third.map_or(0.0, |(_, s)| s);

    let margin = (boosted - second_score) / boosted;
    let mut confidence = 0.6 * margin + 0.4 * (boosted * 2.0).min(1.0);
    if boosted > 0.6 {
        confidence *= 1.3;
    }
    if second_score > 0.9 * boosted || third_score > 0.85 * boosted {
        confidence *= 0.7;
    }
    let confidence = confidence.clamp(0.3, 1.0);

    log::debug!(
        "detect_bpm: {} BPM (score {:.3} + bonus {:.1}, runner-ups {:.3}/{:.3}), confidence {:.2}",
        best,
        top,
        bonus,
        second_score,
        third_score,
        confidence
    );
    Some(BpmResult {
        bpm: best as f32,
        confidence,
    })
}
