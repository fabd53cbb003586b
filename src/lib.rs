//! Resonance - Audio Resonance Engine
//!
//! Plays synthesized speech through a resonant effects chain tuned to a
//! target frequency, optionally layered over a generative ambient drone.
//!
//! # Architecture
//!
//! The system renders offline, one 128-frame quantum at a time:
//! - `engine`: buffers, PCM/WAV codecs, the audio context and the transport
//!   controller ([`Resonator`]) that owns each playback session
//! - `dsp`: nodes (oscillators, buffer sources, filters, compressor, gain,
//!   panner) and the graphs built from them (resonance chain, drone, UI cues)
//! - `speech`: the seam to an external speech synthesizer
//! - `config`: JSON configuration with defaults for every setting

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod speech;

pub use config::EngineConfig;
pub use engine::{AudioBuffer, Resonator, TargetFrequency, TransportEvent, TransportState};
pub use error::{ResonanceError, Result};
