//! Dynamics compressor node
//!
//! Feed-forward compressor with peak detection, a quadratic soft knee and
//! one-pole attack/release smoothing of the gain. Defaults match the
//! "density" stage of the resonance chain: threshold -20 dB, ratio 8:1,
//! 30 dB knee, 3 ms attack, 250 ms release.

use serde::{Deserialize, Serialize};

use super::node::{Lifecycle, Node};
use crate::engine::buffer::db_to_linear;
use crate::error::{ResonanceError, Result};

/// Compressor parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorParams {
    /// Threshold level in dB (-100 to 0 dB)
    pub threshold_db: f32,
    /// Compression ratio (1.0 to 20.0)
    pub ratio: f32,
    /// Knee width in dB (0 = hard knee, up to 40 dB)
    pub knee_db: f32,
    /// Attack time in milliseconds (0 to 1000 ms)
    pub attack_ms: f32,
    /// Release time in milliseconds (0 to 1000 ms)
    pub release_ms: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -20.0,
            ratio: 8.0,
            knee_db: 30.0,
            attack_ms: 3.0,
            release_ms: 250.0,
        }
    }
}

impl CompressorParams {
    /// Validate parameters against their ranges
    pub fn validate(&self) -> Result<()> {
        if !(-100.0..=0.0).contains(&self.threshold_db) {
            return Err(ResonanceError::invalid_parameter(
                "threshold_db",
                self.threshold_db,
                "-100 to 0 dB",
            ));
        }
        if !(1.0..=20.0).contains(&self.ratio) {
            return Err(ResonanceError::invalid_parameter("ratio", self.ratio, "1.0 to 20.0"));
        }
        if !(0.0..=40.0).contains(&self.knee_db) {
            return Err(ResonanceError::invalid_parameter("knee_db", self.knee_db, "0 to 40 dB"));
        }
        if !(0.0..=1000.0).contains(&self.attack_ms) {
            return Err(ResonanceError::invalid_parameter(
                "attack_ms",
                self.attack_ms,
                "0 to 1000 ms",
            ));
        }
        if !(0.0..=1000.0).contains(&self.release_ms) {
            return Err(ResonanceError::invalid_parameter(
                "release_ms",
                self.release_ms,
                "0 to 1000 ms",
            ));
        }
        Ok(())
    }

    /// Clamp parameters to valid ranges
    pub fn clamp(&mut self) {
        self.threshold_db = self.threshold_db.clamp(-100.0, 0.0);
        self.ratio = self.ratio.clamp(1.0, 20.0);
        self.knee_db = self.knee_db.clamp(0.0, 40.0);
        self.attack_ms = self.attack_ms.clamp(0.0, 1000.0);
        self.release_ms = self.release_ms.clamp(0.0, 1000.0);
    }
}

/// Compressor node processing a mono signal in place
#[derive(Debug, Clone)]
pub struct Compressor {
    params: CompressorParams,
    sample_rate: u32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Current smoothed gain (linear)
    gain: f32,
    lifecycle: Lifecycle,
}

impl Compressor {
    pub fn new(params: CompressorParams, sample_rate: u32) -> Self {
        let mut params = params;
        params.clamp();
        let mut comp = Self {
            params,
            sample_rate,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            gain: 1.0,
            lifecycle: Lifecycle::new(),
        };
        comp.update_coefficients();
        comp
    }

    pub fn params(&self) -> &CompressorParams {
        &self.params
    }

    /// Current gain reduction in dB (zero or negative)
    pub fn gain_reduction_db(&self) -> f32 {
        if self.gain > 0.0 {
            20.0 * self.gain.log10()
        } else {
            -96.0
        }
    }

    fn update_coefficients(&mut self) {
        // coeff = exp(-1 / time_in_samples)
        let coeff = |ms: f32| {
            let samples = ms / 1000.0 * self.sample_rate as f32;
            if samples > 0.0 {
                (-1.0 / samples).exp()
            } else {
                0.0
            }
        };
        self.attack_coeff = coeff(self.params.attack_ms);
        self.release_coeff = coeff(self.params.release_ms);
    }

    /// Static gain curve: gain change in dB for an input level in dB
    pub fn compute_gain_reduction_db(&self, input_db: f32) -> f32 {
        let threshold = self.params.threshold_db;
        let ratio = self.params.ratio;
        let knee = self.params.knee_db;

        if knee > 0.0 {
            let knee_start = threshold - knee / 2.0;
            let knee_end = threshold + knee / 2.0;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (threshold + (input_db - threshold) / ratio) - input_db
            } else {
                // Quadratic blend meeting both straight segments
                let over = input_db - knee_start;
                (1.0 / ratio - 1.0) * over * over / (2.0 * knee)
            }
        } else if input_db <= threshold {
            0.0
        } else {
            (threshold + (input_db - threshold) / ratio) - input_db
        }
    }

    /// Compress one block in place; inactive compressors output silence
    pub fn process(&mut self, block: &mut [f32]) {
        if !self.lifecycle.is_active() {
            block.iter_mut().for_each(|s| *s = 0.0);
            return;
        }

        for sample in block.iter_mut() {
            let level = sample.abs();
            let input_db = if level > 0.0 { 20.0 * level.log10() } else { -96.0 };
            let target = db_to_linear(self.compute_gain_reduction_db(input_db));

            let coeff = if target < self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain = coeff * self.gain + (1.0 - coeff) * target;

            *sample *= self.gain;
        }
    }
}

impl Node for Compressor {
    fn kind(&self) -> &'static str {
        "compressor"
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}
