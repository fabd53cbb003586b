//! Engine configuration
//!
//! Every section has working defaults, so a config file only needs the keys
//! it changes. Files are JSON:
//!
//! ```json
//! {
//!   "context": { "sample_rate": 44100 },
//!   "drone": { "level": 0.03 },
//!   "seed": 7
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dsp::chain::{ResonanceParams, START_EPSILON_SECS};
use crate::dsp::drone::DroneParams;
use crate::dsp::graph::RENDER_QUANTUM;
use crate::engine::buffer::{DEFAULT_CONTEXT_SAMPLE_RATE, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE};
use crate::error::{ResonanceError, Result};

/// Format of incoming speech payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

impl Default for SpeechFormat {
    fn default() -> Self {
        Self {
            sample_rate: SPEECH_SAMPLE_RATE,
            channels: SPEECH_CHANNELS,
        }
    }
}

/// Rendering context settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub sample_rate: u32,
    /// Frames per render quantum
    pub quantum: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_CONTEXT_SAMPLE_RATE,
            quantum: RENDER_QUANTUM,
        }
    }
}

/// Transport timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Interval between progress polls in seconds (one display frame)
    pub poll_interval_secs: f64,
    /// Start offsets stay this far before the end of the buffer
    pub start_epsilon_secs: f64,
    /// Whether the ambient drone is layered under new sessions
    pub drone_enabled: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1.0 / 60.0,
            start_epsilon_secs: START_EPSILON_SECS,
            drone_enabled: false,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub speech: SpeechFormat,
    pub context: ContextConfig,
    pub transport: TransportConfig,
    pub resonance: ResonanceParams,
    pub drone: DroneParams,
    /// Seed for the drone's noise and detune; random when absent
    pub seed: Option<u64>,
}

impl EngineConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parse and validate JSON config text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty JSON, suitable for writing back to a file
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !(8000..=192_000).contains(&self.speech.sample_rate) {
            return Err(ResonanceError::invalid_parameter(
                "speech.sample_rate",
                self.speech.sample_rate,
                "8000 to 192000 Hz",
            ));
        }
        if !(1..=8).contains(&self.speech.channels) {
            return Err(ResonanceError::invalid_parameter(
                "speech.channels",
                self.speech.channels,
                "1 to 8",
            ));
        }
        if !(8000..=192_000).contains(&self.context.sample_rate) {
            return Err(ResonanceError::invalid_parameter(
                "context.sample_rate",
                self.context.sample_rate,
                "8000 to 192000 Hz",
            ));
        }
        if !(16..=8192).contains(&self.context.quantum) {
            return Err(ResonanceError::invalid_parameter(
                "context.quantum",
                self.context.quantum,
                "16 to 8192 frames",
            ));
        }
        if !(self.transport.poll_interval_secs > 0.0 && self.transport.poll_interval_secs <= 1.0) {
            return Err(ResonanceError::invalid_parameter(
                "transport.poll_interval_secs",
                self.transport.poll_interval_secs,
                "above 0 and at most 1 second",
            ));
        }
        if !(0.0..=1.0).contains(&self.transport.start_epsilon_secs) {
            return Err(ResonanceError::invalid_parameter(
                "transport.start_epsilon_secs",
                self.transport.start_epsilon_secs,
                "0 to 1 second",
            ));
        }
        self.resonance.validate()?;
        self.drone.validate()
    }
}
