//! Integration Tests
//!
//! End-to-end tests for the resonance pipeline: payload decoding, WAV
//! export, the playback transport and the layered drone.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use resonance::config::EngineConfig;
use resonance::dsp::{render_graph, ResonanceChain, ResonanceParams, ZenDrone};
use resonance::engine::{
    decode_base64_pcm, decode_wav, encode_wav, AudioBuffer, AudioSink, MemorySink, NullSink,
    PlayRequest, Resonator, TargetFrequency, TransportEvent, TransportState,
};
use resonance::ResonanceError;

/// Base64 16-bit mono PCM sine at 24 kHz
fn sine_payload(frequency: f64, seconds: f64) -> String {
    let frames = (seconds * 24000.0) as usize;
    let bytes: Vec<u8> = (0..frames)
        .flat_map(|i| {
            let s = 0.5 * (std::f64::consts::TAU * frequency * i as f64 / 24000.0).sin();
            ((s * 32767.0) as i16).to_le_bytes()
        })
        .collect();
    STANDARD.encode(bytes)
}

fn seeded_config(drone: bool) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.seed = Some(42);
    config.transport.drone_enabled = drone;
    config
}

fn start(config: EngineConfig, target: &str, sink: Box<dyn AudioSink>, seconds: f64) -> Resonator {
    let mut resonator = Resonator::new(config, TargetFrequency::parse(target), sink);
    assert_eq!(resonator.request_play().unwrap(), PlayRequest::NeedsSynthesis);
    resonator
        .complete_synthesis(Ok(sine_payload(220.0, seconds)))
        .unwrap();
    resonator
}

struct BrokenSink;

impl AudioSink for BrokenSink {
    fn name(&self) -> &str {
        "broken"
    }

    fn open(&mut self, _sample_rate: u32, _channels: usize) -> resonance::Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no output device").into())
    }

    fn write(&mut self, _block: &AudioBuffer) -> resonance::Result<()> {
        Ok(())
    }
}

// === Decoding & Export ===

#[test]
fn test_decode_known_bytes() {
    // 0x8000 and 0x7FFF, little-endian
    let payload = STANDARD.encode([0x00u8, 0x80, 0xFF, 0x7F]);
    let buffer = decode_base64_pcm(&payload, 24000, 1).unwrap();

    assert_eq!(buffer.num_samples(), 2);
    assert_eq!(buffer.channel(0)[0], -1.0);
    assert_abs_diff_eq!(buffer.channel(0)[1], 32767.0 / 32768.0);
}

#[test]
fn test_pcm_wav_round_trip() {
    let buffer = decode_base64_pcm(&sine_payload(440.0, 0.1), 24000, 1).unwrap();
    let blob = encode_wav(&buffer).unwrap();
    let decoded = decode_wav(blob.as_bytes()).unwrap();

    assert_eq!(decoded.sample_rate, 24000);
    assert_eq!(decoded.num_samples(), buffer.num_samples());
    for (a, b) in buffer.channel(0).iter().zip(decoded.channel(0)) {
        assert!((a - b).abs() <= 1.0 / 32768.0 + 1e-6, "{} vs {}", a, b);
    }
}

#[test]
fn test_misaligned_payload_rejected() {
    let payload = STANDARD.encode([0x00u8, 0x80, 0xFF]);
    let err = decode_base64_pcm(&payload, 24000, 1).unwrap_err();
    assert!(matches!(err, ResonanceError::MisalignedPcm { .. }));
}

// === Resonance Chain ===

#[test]
fn test_chain_audible_across_targets() {
    let voice = Arc::new(decode_base64_pcm(&sine_payload(300.0, 0.3), 24000, 1).unwrap());
    for hz in [20.0, 100.0, 432.0, 852.0, 5000.0, 20000.0] {
        let mut chain = ResonanceChain::build(
            Arc::clone(&voice),
            hz,
            0.0,
            0.0,
            &ResonanceParams::default(),
            48000,
        )
        .unwrap();
        let out = render_graph(&mut chain, 48000, 0.3);
        assert!(out.is_finite(), "non-finite output at {} Hz", hz);
        assert!(out.peak() > 0.001, "silent output at {} Hz", hz);
    }
}

// === Transport ===

#[test]
fn test_seek_scenario_528() {
    let mut r = start(EngineConfig::default(), "528Hz", Box::new(NullSink), 3.0);
    assert_eq!(r.state(), TransportState::Playing);
    assert_eq!(r.target().hz(), 528.0);

    assert!(r.advance(1.0).unwrap().is_empty());
    r.seek(2.0).unwrap();
    assert_eq!(r.current_time(), 2.0);
    assert!(r.is_playing());

    let events = r.advance(1.5).unwrap();
    assert_eq!(events.len(), 1);
    let TransportEvent::Ended { position } = events[0];
    assert!(position >= 3.0, "ended at {}", position);
    assert_eq!(r.state(), TransportState::Idle);
    assert_eq!(r.current_time(), 0.0);
}

#[test]
fn test_pause_resume_continues() {
    let mut r = start(EngineConfig::default(), "432Hz", Box::new(NullSink), 3.0);
    r.advance(1.2).unwrap();
    r.pause().unwrap();
    let paused_at = r.current_time();

    r.advance(0.7).unwrap();
    r.request_play().unwrap();
    assert_abs_diff_eq!(r.current_time(), paused_at, epsilon = 1e-9);

    r.advance(0.5).unwrap();
    assert!(r.current_time() > paused_at + 0.45);
}

#[test]
fn test_seek_near_end_finishes_promptly() {
    let mut r = start(EngineConfig::default(), "639Hz", Box::new(NullSink), 3.0);
    r.seek(3.0 - 0.1).unwrap();
    let events = r.advance(0.1 + 2.0 / 60.0).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(r.state(), TransportState::Idle);
}

#[test]
fn test_busy_while_loading() {
    let mut r = Resonator::new(
        EngineConfig::default(),
        TargetFrequency::default(),
        Box::new(NullSink),
    );
    r.request_play().unwrap();
    assert_eq!(r.state(), TransportState::Loading);
    let err = r.seek(1.0).unwrap_err();
    assert_eq!(err.error_code(), "TRANSPORT_BUSY");
}

#[test]
fn test_device_failure_returns_to_idle() {
    let mut r = Resonator::new(
        EngineConfig::default(),
        TargetFrequency::default(),
        Box::new(BrokenSink),
    );
    r.request_play().unwrap();
    let err = r
        .complete_synthesis(Ok(sine_payload(220.0, 1.0)))
        .unwrap_err();

    assert!(matches!(err, ResonanceError::DeviceUnavailable { .. }));
    assert_eq!(r.state(), TransportState::Idle);
    assert_eq!(r.active_node_count(), 0);
    // The decoded audio is kept for the next attempt
    assert!(r.has_buffer());
}

// === Drone Layer ===

#[test]
fn test_drone_is_additive() {
    let voice_only = MemorySink::new();
    let layered = MemorySink::new();

    let mut plain = start(seeded_config(false), "528Hz", Box::new(voice_only.clone()), 1.0);
    let mut with_drone = start(seeded_config(true), "528Hz", Box::new(layered.clone()), 1.0);
    plain.advance(0.5).unwrap();
    with_drone.advance(0.5).unwrap();

    let config = seeded_config(true);
    let mut drone = ZenDrone::build(528.0, 0.0, &config.drone, 48000, 42).unwrap();
    let drone_only = render_graph(&mut drone, 48000, 0.5);

    let a = voice_only.snapshot();
    let b = layered.snapshot();
    let n = drone_only.num_samples().min(a.num_samples()).min(b.num_samples());
    assert!(n > 20000);
    for ch in 0..2 {
        for i in 0..n {
            let diff = b.channel(ch)[i] - a.channel(ch)[i];
            assert_abs_diff_eq!(diff, drone_only.channel(ch)[i], epsilon = 1e-5);
        }
    }
}

#[test]
fn test_no_active_nodes_after_release() {
    let mut r = start(seeded_config(true), "741Hz", Box::new(NullSink), 3.0);
    r.advance(0.5).unwrap();
    assert!(r.active_node_count() > 0);

    r.release_all();
    assert_eq!(r.active_node_count(), 0);
    assert_eq!(r.context().graph_count(), 0);
}

#[test]
fn test_drone_tail_gone_after_fade() {
    let mut r = start(seeded_config(true), "852Hz", Box::new(NullSink), 3.0);
    r.advance(0.5).unwrap();
    r.stop().unwrap();
    assert!(r.active_node_count() > 0);

    r.advance(2.1).unwrap();
    assert_eq!(r.active_node_count(), 0);
}
