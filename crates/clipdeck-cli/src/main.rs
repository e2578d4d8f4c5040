//! Clipdeck - record, chop and process samples from the command line
//!
//! This is the command line front end for the clipdeck engine. It:
//! 1. Loads `~/.config/clipdeck/config.yaml` (defaults when missing)
//! 2. Opens the capture and monitor devices for `record`
//! 3. Runs offline analysis and rendering on WAV files
//!
//! Run `clipdeck --help` for the commands and their options.

mod args;

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;

use args::{Cli, Command, RecordArgs, RenderArgs};
use clipdeck_core::analysis::{BpmResult, KeyResult};
use clipdeck_core::audio::{get_input_devices, get_output_devices, start_audio_system, AudioDevice, AudioSystem};
use clipdeck_core::codec::{decode_wav, encode_export};
use clipdeck_core::config::{default_config_path, default_recordings_path, load_config, ClipdeckConfig};
use clipdeck_core::engine::{Engine, EngineEvent, EngineState};
use clipdeck_core::transform::render;
use clipdeck_core::AudioBuffer;

/// How often the record loop polls the engine
const TICK_INTERVAL: Duration = Duration::from_millis(10);

fn main() {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run() {
        log::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Offline work fans out over channels and FFT frames
    rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("rayon-clipdeck-{}", i))
        .build_global()
        .context("Failed to initialize Rayon thread pool")?;

    let config: ClipdeckConfig = load_config(&default_config_path());

    match cli.command {
        Command::Devices => list_devices(),
        Command::Analyze { input } => analyze(&input, &config),
        Command::Render(render_args) => render_file(&render_args),
        Command::Record(record_args) => record(config, &record_args),
    }
}

fn print_devices(title: &str, devices: &[AudioDevice]) {
    println!("{}:", title);
    if devices.is_empty() {
        println!("  (none)");
    }
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        println!(
            " {} {}  ({} ch, {:?} Hz)",
            marker, device, device.max_channels, device.sample_rates
        );
    }
}

fn list_devices() -> Result<()> {
    print_devices("Input devices", &get_input_devices());
    println!();
    print_devices("Output devices", &get_output_devices());
    Ok(())
}

fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let buffer = decode_wav(&bytes).with_context(|| format!("Failed to decode {:?}", path))?;
    log::info!(
        "Loaded {:?}: {} channels, {}Hz, {:.2}s",
        path,
        buffer.channel_count(),
        buffer.sample_rate(),
        buffer.duration_seconds()
    );
    Ok(buffer)
}

fn analyze(input: &Path, config: &ClipdeckConfig) -> Result<()> {
    let buffer = read_wav(input)?;

    let (bpm, key): (Option<BpmResult>, KeyResult) = rayon::join(
        || clipdeck_core::analysis::detect_bpm_with_options(&buffer, config.engine.bpm_range),
        || clipdeck_core::analysis::detect_key(&buffer),
    );

    match bpm {
        Some(bpm) => println!("Tempo: {:.1} BPM (confidence {:.2})", bpm.bpm, bpm.confidence),
        None => println!("Tempo: not detected"),
    }
    let (camelot_number, camelot_letter) = key.key.camelot();
    println!(
        "Key:   {} (confidence {:.2}, Camelot {}{})",
        key.key, key.confidence, camelot_number, camelot_letter
    );
    for alt in &key.alternatives {
        println!("       alt {} ({:.2})", alt.key, alt.confidence);
    }
    Ok(())
}

fn render_file(args: &RenderArgs) -> Result<()> {
    let options = args.options().map_err(anyhow::Error::msg)?;
    let format = args.format().map_err(anyhow::Error::msg)?;
    let buffer = read_wav(&args.input)?;
    let started = Instant::now();
    let rendered = render(&buffer, &options, None).context("Render failed")?;
    let bytes = encode_export(&rendered, format).context("Encoding failed")?;
    std::fs::write(&args.output, &bytes).with_context(|| format!("Failed to write {:?}", args.output))?;
    println!(
        "Wrote {:?} ({:.2}s, {} bytes) in {:?}",
        args.output,
        rendered.duration_seconds(),
        bytes.len(),
        started.elapsed()
    );
    Ok(())
}

fn record(mut config: ClipdeckConfig, args: &RecordArgs) -> Result<()> {
    if let Some(threshold) = args.threshold {
        config.engine.threshold = threshold;
    }
    let out = args.out.clone().unwrap_or_else(default_recordings_path);

    let AudioSystem {
        handle: _streams,
        graph,
        sample_rate,
        input_channels,
        latency_ms,
        ..
    } = start_audio_system(&config.audio, &config.engine.eq, &config.engine.gate)
        .context("Could not start audio")?;
    println!(
        "Audio running: {} Hz, {} input channels, {:.1} ms output latency",
        sample_rate, input_channels, latency_ms
    );

    let (mut engine, events) = Engine::new(config.engine.clone(), graph);
    if args.now {
        engine.start_recording()?;
    } else {
        engine.arm()?;
        println!("Armed at threshold {:.0}, waiting for input...", engine.threshold());
    }

    let take_length = Duration::from_secs_f64(args.seconds);
    let mut recording_since: Option<Instant> = None;

    let result = loop {
        engine.tick()?;

        for event in events.try_iter() {
            match event {
                EngineEvent::ThresholdExceeded { peak } => println!("Input peak {:.2}, recording", peak),
                EngineEvent::RecordingStarted => recording_since = Some(Instant::now()),
                EngineEvent::StateChanged { from, to } => log::debug!("state {} -> {}", from, to),
                EngineEvent::RecordingStopped(_) => {}
            }
        }

        if engine.state() == EngineState::Recording
            && recording_since.is_some_and(|since| since.elapsed() >= take_length)
        {
            break engine.stop_recording()?;
        }
        thread::sleep(TICK_INTERVAL);
    };

    if result.dropped_frames > 0 {
        log::warn!("{} frames were dropped during the take", result.dropped_frames);
    }
    if result.is_empty() {
        bail!("Nothing was captured");
    }

    std::fs::create_dir_all(&out).with_context(|| format!("Failed to create {:?}", out))?;
    let path: PathBuf = out.join(
        chrono::Local::now()
            .format("clipdeck-%Y%m%d-%H%M%S.wav")
            .to_string(),
    );
    std::fs::write(&path, &result.wav).with_context(|| format!("Failed to write {:?}", path))?;
    println!("Saved {:.2}s to {:?}", result.duration_seconds(), path);
    Ok(())
}
