//! Command line parsing

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use clipdeck_core::codec::ExportFormat;
use clipdeck_core::params::{BitDepth, EqSettings, GateSettings, Mp3Bitrate};
use clipdeck_core::transform::RenderOptions;
use clipdeck_core::Region;

#[derive(Parser, Debug)]
#[command(name = "clipdeck", version, about = "Record, chop and process samples")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List capture and monitor devices
    Devices,
    /// Estimate tempo and key of a WAV file
    Analyze {
        /// WAV file to analyze
        input: PathBuf,
    },
    /// Run the render pipeline and write .wav or .mp3
    Render(RenderArgs),
    /// Arm and auto-record when the input crosses the threshold
    Record(RecordArgs),
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Source WAV file
    pub input: PathBuf,
    /// Destination, .wav or .mp3
    pub output: PathBuf,

    /// Crop to START:END (fractions 0-1)
    #[arg(long, value_name = "START:END", value_parser = parse_region)]
    pub region: Option<Region>,
    /// Spectral noise reduction strength (0-1)
    #[arg(long, value_name = "STRENGTH")]
    pub denoise: Option<f32>,
    /// Noise gate SENSITIVITY:AMOUNT (0-1 each)
    #[arg(long, value_name = "SENS:AMOUNT", value_parser = parse_gate)]
    pub gate: Option<GateSettings>,
    /// Band gains LOW:MID:HIGH in dB
    #[arg(long, value_name = "LOW:MID:HIGH", value_parser = parse_eq, allow_hyphen_values = true)]
    pub eq: Option<EqSettings>,
    /// Change duration (2 = twice as long)
    #[arg(long, value_name = "RATIO", value_parser = parse_finite)]
    pub stretch: Option<f64>,
    /// Keep pitch when stretching
    #[arg(long)]
    pub preserve_pitch: bool,
    /// Resample to this rate
    #[arg(long, value_name = "HZ")]
    pub rate: Option<u32>,
    /// Reduce resolution to this many bits (1-24)
    #[arg(long, value_name = "BITS")]
    pub bitcrush: Option<u8>,
    /// Play backwards
    #[arg(long)]
    pub reverse: bool,
    /// Peak normalize
    #[arg(long)]
    pub normalize: bool,
    /// WAV bit depth (16, 24 or 32)
    #[arg(long, default_value = "16", value_parser = parse_bit_depth)]
    pub bits: BitDepth,
    /// MP3 bitrate in kbps (128, 192, 256 or 320)
    #[arg(long, default_value = "192", value_parser = parse_bitrate)]
    pub bitrate: Mp3Bitrate,
}

impl RenderArgs {
    /// Build and validate the pipeline options
    pub fn options(&self) -> Result<RenderOptions, String> {
        let mut options = RenderOptions::new()
            .with_reverse(self.reverse)
            .with_normalize(self.normalize);
        if let Some(region) = self.region {
            options = options.with_region(region);
        }
        if let Some(strength) = self.denoise {
            options = options.with_denoise(strength);
        }
        if let Some(gate) = self.gate {
            options = options.with_gate(gate);
        }
        if let Some(eq) = self.eq {
            options = options.with_eq(eq);
        }
        if self.stretch.is_some() || self.preserve_pitch {
            options = options.with_stretch(self.stretch.unwrap_or(1.0), self.preserve_pitch);
        }
        if let Some(rate) = self.rate {
            options = options.with_sample_rate(rate);
        }
        if let Some(bits) = self.bitcrush {
            options = options.with_bitcrush(bits);
        }
        options.validate().map_err(|e| e.to_string())?;
        Ok(options)
    }

    pub fn format(&self) -> Result<ExportFormat, String> {
        format_for_path(&self.output, self.bits, self.bitrate)
    }
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Trigger level (0-100), overrides the config
    #[arg(long, value_parser = parse_threshold)]
    pub threshold: Option<f32>,
    /// Take length in seconds
    #[arg(long, default_value_t = 10.0, value_parser = parse_seconds)]
    pub seconds: f64,
    /// Output directory
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
    /// Start recording without waiting for the threshold
    #[arg(long)]
    pub now: bool,
}

/// Split `a:b[:c...]` into exactly `N` numbers
fn numbers<const N: usize>(raw: &str) -> Result<[f64; N], String> {
    let parts: Vec<f64> = raw
        .split(':')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("'{}': {}", raw, e))?;
    parts
        .try_into()
        .map_err(|_| format!("expected {} values separated by ':'", N))
}

fn parse_finite(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|e| format!("'{}': {}", raw, e))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err("must be a finite number".to_string())
    }
}

fn parse_region(raw: &str) -> Result<Region, String> {
    let [start, end] = numbers::<2>(raw)?;
    Region::new(start, end).map_err(|e| e.to_string())
}

fn parse_gate(raw: &str) -> Result<GateSettings, String> {
    let [sensitivity, amount] = numbers::<2>(raw)?;
    Ok(GateSettings {
        enabled: true,
        sensitivity: sensitivity as f32,
        amount: amount as f32,
    })
}

fn parse_eq(raw: &str) -> Result<EqSettings, String> {
    let [low, mid, high] = numbers::<3>(raw)?;
    let mut eq = EqSettings::default();
    eq.enabled = true;
    eq.low.gain_db = low as f32;
    eq.mid.gain_db = mid as f32;
    eq.high.gain_db = high as f32;
    Ok(eq)
}

fn parse_bit_depth(raw: &str) -> Result<BitDepth, String> {
    let bits: u16 = raw.parse().map_err(|e| format!("'{}': {}", raw, e))?;
    BitDepth::try_from(bits).map_err(|e| e.to_string())
}

fn parse_bitrate(raw: &str) -> Result<Mp3Bitrate, String> {
    let kbps: u16 = raw.parse().map_err(|e| format!("'{}': {}", raw, e))?;
    Mp3Bitrate::try_from(kbps).map_err(|e| e.to_string())
}

fn parse_threshold(raw: &str) -> Result<f32, String> {
    let threshold: f32 = raw.parse().map_err(|e| format!("'{}': {}", raw, e))?;
    if (0.0..=100.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err("must be between 0 and 100".to_string())
    }
}

fn parse_seconds(raw: &str) -> Result<f64, String> {
    let seconds = parse_finite(raw)?;
    if seconds > 0.0 {
        Ok(seconds)
    } else {
        Err("must be positive".to_string())
    }
}

/// Pick the export format from the output file extension
pub fn format_for_path(path: &Path, bit_depth: BitDepth, bitrate: Mp3Bitrate) -> Result<ExportFormat, String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("wav") => Ok(ExportFormat::Wav(bit_depth)),
        Some("mp3") => Ok(ExportFormat::Mp3(bitrate)),
        _ => Err(format!("output must end in .wav or .mp3: {:?}", path)),
    }
}
