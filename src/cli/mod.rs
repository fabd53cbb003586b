//! CLI Module
//!
//! Command-line interface for the resonance engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Resonance - speech through a resonant chain tuned to a target frequency
#[derive(Parser, Debug)]
#[command(name = "resonance-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON engine configuration
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode a base64 PCM speech payload into a WAV file
    #[command(name = "decode")]
    Decode {
        /// File holding the base64 payload
        payload: PathBuf,

        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Play a recording through the resonance chain into a WAV file
    #[command(name = "render")]
    Render {
        /// Base64 payload file, or a WAV file
        input: PathBuf,

        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,

        /// Target frequency label, e.g. "528Hz"
        #[arg(short, long, default_value = "432Hz")]
        target: String,

        /// Layer the ambient drone under the voice
        #[arg(long)]
        drone: bool,

        /// Start this many seconds into the recording
        #[arg(long, default_value_t = 0.0)]
        offset: f64,

        /// Seed for the drone's noise and detune
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Render an interface sound cue to a WAV file
    #[command(name = "cue")]
    Cue {
        /// open, close or phase
        cue: String,

        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,

        /// Output sample rate
        #[arg(long, default_value_t = 48000)]
        sample_rate: u32,
    },

    /// Print information about a recording
    #[command(name = "inspect")]
    Inspect {
        /// Base64 payload file, or a WAV file
        input: PathBuf,

        /// Report the resonance filter response at this target
        #[arg(short, long, default_value = "432Hz")]
        target: String,
    },
}
