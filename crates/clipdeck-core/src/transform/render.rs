//! Render pipeline
//!
//! Applies the selected transforms in a fixed order:
//! crop, denoise, noise gate, EQ, stretch, resample, bitcrush, reverse,
//! normalize. All options are validated before the first step runs.

use crate::params::{EqSettings, GateSettings};
use crate::types::{AudioBuffer, Region};

use super::bitcrush::{bitcrush, MAX_CRUSH_BITS};
use super::denoise::{reduce_noise, NoiseModel};
use super::edit::{crop, normalize, reverse};
use super::eq::apply_eq;
use super::error::{check_unit, TransformError, TransformResult};
use super::gate::apply_noise_gate_offline;
use super::resample::resample;
use super::stretch::{time_stretch, time_stretch_preserving_pitch};

/// Duration change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchOptions {
    /// Output length / input length
    pub ratio: f64,
    /// Use the phase vocoder instead of varispeed
    pub preserve_pitch: bool,
}

/// What to do to a buffer on render; every step is optional
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    pub region: Option<Region>,
    /// Noise reduction strength (0.0 - 1.0)
    pub denoise: Option<f32>,
    /// Applied only when `enabled`
    pub gate: Option<GateSettings>,
    pub eq: Option<EqSettings>,
    pub stretch: Option<StretchOptions>,
    pub sample_rate: Option<u32>,
    pub bitcrush: Option<u8>,
    pub reverse: bool,
    pub normalize: bool,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_denoise(mut self, strength: f32) -> Self {
        self.denoise = Some(strength);
        self
    }

    pub fn with_gate(mut self, gate: GateSettings) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_eq(mut self, eq: EqSettings) -> Self {
        self.eq = Some(eq);
        self
    }

    pub fn with_stretch(mut self, ratio: f64, preserve_pitch: bool) -> Self {
        self.stretch = Some(StretchOptions { ratio, preserve_pitch });
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_bitcrush(mut self, bits: u8) -> Self {
        self.bitcrush = Some(bits);
        self
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Reject invalid options before any processing
    pub fn validate(&self) -> TransformResult<()> {
        if let Some(strength) = self.denoise {
            check_unit("strength", strength)?;
        }
        if let Some(gate) = self.gate.filter(|g| g.enabled) {
            check_unit("sensitivity", gate.sensitivity)?;
            check_unit("amount", gate.amount)?;
        }
        if let Some(stretch) = self.stretch {
            if !stretch.ratio.is_finite() || stretch.ratio <= 0.0 {
                return Err(TransformError::InvalidRatio(stretch.ratio));
            }
        }
        if self.sample_rate == Some(0) {
            return Err(TransformError::InvalidSampleRate(0));
        }
        if let Some(bits) = self.bitcrush {
            if bits == 0 || bits > MAX_CRUSH_BITS {
                return Err(TransformError::InvalidBitDepth(bits));
            }
        }
        Ok(())
    }
}

/// Run `buffer` through the pipeline described by `options`
pub fn render(
    buffer: &AudioBuffer,
    options: &RenderOptions,
    noise_model: Option<&dyn NoiseModel>,
) -> TransformResult<AudioBuffer> {
    options.validate()?;

    let mut out = match options.region {
        Some(region) => crop(buffer, region)?,
        None => buffer.clone(),
    };
    if out.is_empty() {
        return Err(TransformError::EmptyBuffer);
    }

    if let Some(strength) = options.denoise {
        out = reduce_noise(&out, strength, noise_model)?;
    }
    if let Some(gate) = options.gate.filter(|g| g.enabled) {
        out = apply_noise_gate_offline(&out, gate.sensitivity, gate.amount)?;
    }
    if let Some(eq) = &options.eq {
        out = apply_eq(&out, eq)?;
    }
    if let Some(stretch) = options.stretch {
        out = if stretch.preserve_pitch {
            time_stretch_preserving_pitch(&out, stretch.ratio)?
        } else {
            time_stretch(&out, stretch.ratio)?
        };
    }
    if let Some(rate) = options.sample_rate {
        out = resample(&out, rate)?;
    }
    if let Some(bits) = options.bitcrush {
        out = bitcrush(&out, bits)?;
    }
    if options.reverse {
        out = reverse(&out);
    }
    if options.normalize {
        out = normalize(&out);
    }

    log::debug!(
        "render: {} frames @ {}Hz -> {} frames @ {}Hz",
        buffer.len(),
        buffer.sample_rate(),
        out.len(),
        out.sample_rate()
    );
    Ok(out)
}
