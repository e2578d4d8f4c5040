//! Processing parameters shared by the live chain and the offline renderer
//!
//! EQ and noise gate settings are plain values: the engine keeps the current
//! copy, forwards it to the real-time chain (which ramps towards it) and hands
//! it to the offline renderer unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest / highest accepted Q for a peaking band
pub const EQ_Q_RANGE: (f32, f32) = (0.1, 18.0);

/// Gain range of a peaking band in dB
pub const EQ_GAIN_RANGE_DB: (f32, f32) = (-24.0, 24.0);

/// Lowest gate threshold (sensitivity = 0), peak envelope
pub const GATE_MIN_THRESHOLD: f32 = 0.001;

/// Threshold span in decades-of-amplitude: threshold = MIN * SPAN^sensitivity
pub const GATE_THRESHOLD_SPAN: f32 = 100.0;

/// Errors for values that arrive as plain numbers (config files, CLI)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("Unsupported bit depth: {0} (expected 16, 24 or 32)")]
    UnsupportedBitDepth(u16),

    #[error("Unsupported MP3 bitrate: {0}kbps (expected 128, 192, 256 or 320)")]
    UnsupportedBitrate(u16),
}

// ═══════════════════════════════════════════════════════════════════════════════
// EQ
// ═══════════════════════════════════════════════════════════════════════════════

/// The three fixed EQ bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EqBandKind {
    Low,
    Mid,
    High,
}

impl EqBandKind {
    pub const ALL: [EqBandKind; 3] = [EqBandKind::Low, EqBandKind::Mid, EqBandKind::High];

    /// Allowed center frequency range in Hz
    pub fn frequency_range(&self) -> (f32, f32) {
        match self {
            EqBandKind::Low => (20.0, 400.0),
            EqBandKind::Mid => (400.0, 4000.0),
            EqBandKind::High => (4000.0, 20000.0),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EqBandKind::Low => "low",
            EqBandKind::Mid => "mid",
            EqBandKind::High => "high",
        }
    }
}

/// One peaking band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqBand {
    /// Center frequency in Hz
    pub frequency: f32,
    pub q: f32,
    pub gain_db: f32,
}

impl EqBand {
    pub fn new(frequency: f32, q: f32, gain_db: f32) -> Self {
        Self {
            frequency,
            q,
            gain_db,
        }
    }

    /// Clamp every field into the range allowed for `kind`
    ///
    /// Non-finite inputs collapse to the lower bound rather than propagating NaN
    /// into filter coefficients.
    pub fn clamped(&self, kind: EqBandKind) -> Self {
        let (f_lo, f_hi) = kind.frequency_range();
        Self {
            frequency: clamp_finite(self.frequency, f_lo, f_hi),
            q: clamp_finite(self.q, EQ_Q_RANGE.0, EQ_Q_RANGE.1),
            gain_db: if self.gain_db.is_finite() {
                self.gain_db.clamp(EQ_GAIN_RANGE_DB.0, EQ_GAIN_RANGE_DB.1)
            } else {
                0.0
            },
        }
    }
}

fn clamp_finite(value: f32, lo: f32, hi: f32) -> f32 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        lo
    }
}

/// Three-band EQ state
///
/// Disabling the EQ keeps all three filters in the chain with 0 dB gain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqSettings {
    pub enabled: bool,
    pub low: EqBand,
    pub mid: EqBand,
    pub high: EqBand,
}

impl Default for EqSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            low: EqBand::new(100.0, 0.7, 0.0),
            mid: EqBand::new(1000.0, 0.7, 0.0),
            high: EqBand::new(8000.0, 0.7, 0.0),
        }
    }
}

impl EqSettings {
    /// Raw (unclamped) band
    pub fn band(&self, kind: EqBandKind) -> EqBand {
        match kind {
            EqBandKind::Low => self.low,
            EqBandKind::Mid => self.mid,
            EqBandKind::High => self.high,
        }
    }

    /// Band as it is actually applied: clamped, and flat when disabled
    pub fn effective_band(&self, kind: EqBandKind) -> EqBand {
        let mut band = self.band(kind).clamped(kind);
        if !self.enabled {
            band.gain_db = 0.0;
        }
        band
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Noise gate
// ═══════════════════════════════════════════════════════════════════════════════

/// Noise gate parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    pub enabled: bool,
    /// 0.0 - 1.0, higher gates louder material
    pub sensitivity: f32,
    /// 0.0 - 1.0, gain reduction applied while closed
    pub amount: f32,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            sensitivity: 0.5,
            amount: 0.8,
        }
    }
}

impl GateSettings {
    /// Envelope threshold for the configured sensitivity (log-linear mapping)
    pub fn threshold(&self) -> f32 {
        threshold_for_sensitivity(self.sensitivity)
    }

    /// Gain applied while the gate is closed
    pub fn closed_gain(&self) -> f32 {
        1.0 - clamp_finite(self.amount, 0.0, 1.0)
    }
}

/// Map sensitivity 0..1 to 0.001..0.1
pub fn threshold_for_sensitivity(sensitivity: f32) -> f32 {
    GATE_MIN_THRESHOLD * GATE_THRESHOLD_SPAN.powf(clamp_finite(sensitivity, 0.0, 1.0))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Export formats
// ═══════════════════════════════════════════════════════════════════════════════

/// WAV sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum BitDepth {
    /// 16-bit integer PCM
    Sixteen,
    /// 24-bit integer PCM
    TwentyFour,
    /// 32-bit IEEE float
    ThirtyTwoFloat,
}

impl BitDepth {
    pub fn bits(&self) -> u16 {
        match self {
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
            BitDepth::ThirtyTwoFloat => 32,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bits() as usize / 8
    }

    /// WAVE format tag (1 = PCM, 3 = IEEE float)
    pub fn format_tag(&self) -> u16 {
        match self {
            BitDepth::ThirtyTwoFloat => 3,
            _ => 1,
        }
    }
}

impl Default for BitDepth {
    fn default() -> Self {
        Self::Sixteen
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = ParamError;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        match bits {
            16 => Ok(BitDepth::Sixteen),
            24 => Ok(BitDepth::TwentyFour),
            32 => Ok(BitDepth::ThirtyTwoFloat),
            other => Err(ParamError::UnsupportedBitDepth(other)),
        }
    }
}

impl From<BitDepth> for u16 {
    fn from(depth: BitDepth) -> u16 {
        depth.bits()
    }
}

/// Constant MP3 bitrates offered for export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Mp3Bitrate {
    Kbps128,
    Kbps192,
    Kbps256,
    Kbps320,
}

impl Mp3Bitrate {
    pub fn kbps(&self) -> u16 {
        match self {
            Mp3Bitrate::Kbps128 => 128,
            Mp3Bitrate::Kbps192 => 192,
            Mp3Bitrate::Kbps256 => 256,
            Mp3Bitrate::Kbps320 => 320,
        }
    }
}

impl Default for Mp3Bitrate {
    fn default() -> Self {
        Self::Kbps192
    }
}

impl TryFrom<u16> for Mp3Bitrate {
    type Error = ParamError;

    fn try_from(kbps: u16) -> Result<Self, Self::Error> {
        match kbps {
            128 => Ok(Mp3Bitrate::Kbps128),
            192 => Ok(Mp3Bitrate::Kbps192),
            256 => Ok(Mp3Bitrate::Kbps256),
            320 => Ok(Mp3Bitrate::Kbps320),
            other => Err(ParamError::UnsupportedBitrate(other)),
        }
    }
}

impl From<Mp3Bitrate> for u16 {
    fn from(bitrate: Mp3Bitrate) -> u16 {
        bitrate.kbps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_clamping() {
        let band = EqBand::new(10.0, 50.0, 40.0).clamped(EqBandKind::Low);
        assert_eq!(band, EqBand::new(20.0, 18.0, 24.0));

        let band = EqBand::new(100.0, 0.01, -40.0).clamped(EqBandKind::Mid);
        assert_eq!(band, EqBand::new(400.0, 0.1, -24.0));

        let band = EqBand::new(f32::NAN, 1.0, f32::INFINITY).clamped(EqBandKind::High);
        assert_eq!(band.frequency, 4000.0);
        assert_eq!(band.gain_db, 0.0);
    }

    #[test]
    fn test_disabled_eq_is_flat() {
        let mut eq = EqSettings::default();
        eq.mid.gain_db = 6.0;
        assert_eq!(eq.effective_band(EqBandKind::Mid).gain_db, 0.0);
        eq.enabled = true;
        assert_eq!(eq.effective_band(EqBandKind::Mid).gain_db, 6.0);
    }

    #[test]
    fn test_gate_threshold_mapping() {
        assert!((threshold_for_sensitivity(0.0) - 0.001).abs() < 1e-7);
        assert!((threshold_for_sensitivity(0.5) - 0.01).abs() < 1e-6);
        assert!((threshold_for_sensitivity(1.0) - 0.1).abs() < 1e-6);
        assert!((threshold_for_sensitivity(3.0) - 0.1).abs() < 1e-6);

        let gate = GateSettings { enabled: true, sensitivity: 0.5, amount: 1.0 };
        assert_eq!(gate.closed_gain(), 0.0);
    }

    #[test]
    fn test_bit_depth_conversion() {
        assert_eq!(BitDepth::try_from(24), Ok(BitDepth::TwentyFour));
        assert_eq!(BitDepth::try_from(8), Err(ParamError::UnsupportedBitDepth(8)));
        assert_eq!(BitDepth::ThirtyTwoFloat.format_tag(), 3);
        assert_eq!(BitDepth::Sixteen.format_tag(), 1);
        assert_eq!(Mp3Bitrate::try_from(320), Ok(Mp3Bitrate::Kbps320));
        assert!(Mp3Bitrate::try_from(160).is_err());
    }

    #[test]
    fn test_serde_plain_numbers() {
        let yaml = serde_yaml::to_string(&BitDepth::TwentyFour).unwrap();
        assert_eq!(yaml.trim(), "24");
        let parsed: Mp3Bitrate = serde_yaml::from_str("256").unwrap();
        assert_eq!(parsed, Mp3Bitrate::Kbps256);
        assert!(serde_yaml::from_str::<BitDepth>("12").is_err());
    }
}
