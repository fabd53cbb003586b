//! Target frequencies and ritual phases
//!
//! Frequencies arrive as display labels such as `"432Hz"` or `"528 Hz"`.
//! Parsing never fails: anything without a usable leading number falls back
//! to 432 Hz.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ResonanceError, Result};

/// Frequency used when a label cannot be parsed
pub const DEFAULT_TARGET_HZ: f64 = 432.0;

/// Resonance target in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetFrequency(f64);

impl TargetFrequency {
    /// Wrap a frequency, substituting the default for unusable values
    pub fn new(hz: f64) -> Self {
        if hz.is_finite() && hz > 0.0 {
            Self(hz)
        } else {
            Self(DEFAULT_TARGET_HZ)
        }
    }

    /// Parse the leading number of a label like `"432Hz"`
    ///
    /// # Example
    /// ```
    /// use resonance::engine::TargetFrequency;
    ///
    /// assert_eq!(TargetFrequency::parse("528Hz").hz(), 528.0);
    /// assert_eq!(TargetFrequency::parse("Hz").hz(), 432.0);
    /// ```
    pub fn parse(label: &str) -> Self {
        let trimmed = label.trim_start();
        let end = trimmed
            .char_indices()
            .find(|&(i, c)| {
                !(c.is_ascii_digit() || c == '.' || ((c == '-' || c == '+') && i == 0))
            })
            .map_or(trimmed.len(), |(i, _)| i);

        match trimmed[..end].parse::<f64>() {
            Ok(hz) if hz.is_finite() && hz > 0.0 => Self(hz),
            _ => {
                warn!(label, fallback = DEFAULT_TARGET_HZ, "unusable frequency label");
                Self(DEFAULT_TARGET_HZ)
            }
        }
    }

    pub fn hz(self) -> f64 {
        self.0
    }
}

impl Default for TargetFrequency {
    fn default() -> Self {
        Self(DEFAULT_TARGET_HZ)
    }
}

impl fmt::Display for TargetFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz", self.0)
    }
}

impl From<&str> for TargetFrequency {
    fn from(label: &str) -> Self {
        Self::parse(label)
    }
}

impl From<RitualPhase> for TargetFrequency {
    fn from(phase: RitualPhase) -> Self {
        phase.frequency()
    }
}

/// Stages of the ritual, each tuned to its own frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RitualPhase {
    #[default]
    Initiation,
    Purification,
    Illumination,
    Ascension,
    HolyDomain,
}

impl RitualPhase {
    pub const ALL: [RitualPhase; 5] = [
        RitualPhase::Initiation,
        RitualPhase::Purification,
        RitualPhase::Illumination,
        RitualPhase::Ascension,
        RitualPhase::HolyDomain,
    ];

    pub fn frequency(self) -> TargetFrequency {
        TargetFrequency(match self {
            RitualPhase::Initiation => 432.0,
            RitualPhase::Purification => 528.0,
            RitualPhase::Illumination => 639.0,
            RitualPhase::Ascension => 741.0,
            RitualPhase::HolyDomain => 852.0,
        })
    }

    /// The following phase, or `None` after the last one
    pub fn next(self) -> Option<RitualPhase> {
        let index = Self::ALL.iter().position(|&p| p == self)?;
        Self::ALL.get(index + 1).copied()
    }
}

impl fmt::Display for RitualPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RitualPhase::Initiation => "initiation",
            RitualPhase::Purification => "purification",
            RitualPhase::Illumination => "illumination",
            RitualPhase::Ascension => "ascension",
            RitualPhase::HolyDomain => "holy_domain",
        };
        f.write_str(name)
    }
}

impl FromStr for RitualPhase {
    type Err = ResonanceError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|p| p.to_string() == normalized)
            .ok_or_else(|| {
                ResonanceError::invalid_parameter(
                    "phase",
                    s,
                    "initiation, purification, illumination, ascension or holy_domain",
                )
            })
    }
}
