//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::EngineConfig;
use crate::dsp::biquad::{BiquadCoeffs, FilterType};
use crate::dsp::cue::{render_cue, UiCue};
use crate::engine::buffer::{calculate_rms, linear_to_db, AudioBuffer};
use crate::engine::pcm::decode_base64_pcm;
use crate::engine::sink::WavFileSink;
use crate::engine::transport::{format_clock, Resonator, TransportEvent};
use crate::engine::wav::{read_wav, write_wav};
use crate::engine::TargetFrequency;

/// Longest render before giving up on the end of playback
const MAX_RENDER_SECS: f64 = 3600.0;

/// Load the config file if one was given, defaults otherwise
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

/// Read a recording from a WAV file or a base64 payload file
fn load_recording(path: &Path, config: &EngineConfig) -> Result<AudioBuffer> {
    if is_wav(path) {
        return read_wav(path).with_context(|| format!("Failed to read {}", path.display()));
    }
    let payload = fs::read_to_string(path)
        .with_context(|| format!("Failed to read payload {}", path.display()))?;
    decode_base64_pcm(&payload, config.speech.sample_rate, config.speech.channels)
        .with_context(|| format!("Failed to decode payload {}", path.display()))
}

/// Decode a speech payload and save it as WAV.
pub fn decode(config: &EngineConfig, payload: &Path, output: &Path) -> Result<()> {
    info!("Decoding payload: {}", payload.display());

    let buffer = load_recording(payload, config)?;
    write_wav(&buffer, output).with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Decoded {} ({} Hz, {} ch) -> {}",
        format_clock(buffer.duration_secs()),
        buffer.sample_rate,
        buffer.num_channels(),
        output.display()
    );
    Ok(())
}

/// Play a recording through the resonance chain, capturing the output.
pub fn render(
    mut config: EngineConfig,
    input: &Path,
    output: &Path,
    target: &str,
    drone: bool,
    offset: f64,
    seed: Option<u64>,
) -> Result<()> {
    info!("Rendering {} at {}", input.display(), target);

    if seed.is_some() {
        config.seed = seed;
    }
    config.transport.drone_enabled = drone;
    let fade_out = config.drone.fade_out_secs;

    let buffer = load_recording(input, &config)?;
    let duration = buffer.duration_secs();

    let target = TargetFrequency::parse(target);
    let mut resonator = Resonator::new(config, target, Box::new(WavFileSink::new(output)));
    resonator.load_buffer(buffer)?;
    resonator
        .play_from(offset)
        .with_context(|| format!("Failed to start playback into {}", output.display()))?;

    let mut ended = None;
    let mut rendered = 0.0;
    while ended.is_none() && rendered < MAX_RENDER_SECS {
        for event in resonator.advance(1.0)? {
            let TransportEvent::Ended { position } = event;
            ended = Some(position);
        }
        rendered += 1.0;
    }
    let Some(position) = ended else {
        bail!("Playback did not finish within {} seconds", MAX_RENDER_SECS);
    };

    // Let the drone fade out before the file is closed
    if drone {
        resonator.advance(fade_out + 0.1)?;
    }
    let total = resonator.context().current_time();
    resonator.close()?;

    println!(
        "Rendered {} of {} at {} -> {} ({} total{})",
        format_clock(position),
        format_clock(duration),
        target,
        output.display(),
        format_clock(total),
        if drone { ", with drone" } else { "" }
    );
    Ok(())
}

/// Render one of the interface sound cues.
pub fn cue(name: &str, output: &Path, sample_rate: u32) -> Result<()> {
    let cue: UiCue = name.parse()?;
    info!("Rendering cue: {}", cue);

    let buffer = render_cue(cue, sample_rate)?;
    write_wav(&buffer, output).with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Cue '{}' ({:.2}s) -> {}", cue, cue.duration_secs(), output.display());
    Ok(())
}

/// Print basic facts about a recording and the filter tuned to `target`.
pub fn inspect(config: &EngineConfig, input: &Path, target: &str) -> Result<()> {
    let buffer = load_recording(input, config)?;
    let target = TargetFrequency::parse(target);

    println!("File:        {}", input.display());
    println!("{:-<40}", "");
    println!("Duration:    {} ({:.3}s)", format_clock(buffer.duration_secs()), buffer.duration_secs());
    println!("Sample rate: {} Hz", buffer.sample_rate);
    println!("Channels:    {}", buffer.num_channels());
    println!("Peak:        {:.1} dBFS", linear_to_db(buffer.peak()));
    println!("RMS:         {:.1} dBFS", linear_to_db(calculate_rms(&buffer)));

    let params = &config.resonance;
    let rate = config.context.sample_rate as f64;
    let coeffs = BiquadCoeffs::calculate(
        FilterType::Peak,
        rate,
        target.hz(),
        params.gain_db,
        params.q,
    );
    println!("{:-<40}", "");
    println!("Resonance at {} (Q {}, {:+} dB):", target, params.q, params.gain_db);
    for hz in [target.hz() / 2.0, target.hz(), target.hz() * 2.0] {
        let db = 20.0 * coeffs.magnitude_at(hz, rate).log10();
        println!("  {:>8.1} Hz  {:+6.1} dB", hz, db);
    }
    Ok(())
}
