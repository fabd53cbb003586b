//! Speech synthesis collaborator
//!
//! The engine does not talk to a TTS service itself. Callers plug one in
//! through [`SpeechSynthesizer`], which turns a [`SynthesisRequest`] into the
//! base64 PCM payload the decoder understands. [`PayloadFile`] replays a
//! payload saved to disk, and any `FnMut(&SynthesisRequest) -> Result<String>`
//! closure works as a synthesizer too.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ResonanceError, Result};

/// Longest text sent for synthesis, in characters
pub const MAX_TEXT_CHARS: usize = 1000;

/// Prebuilt voices offered by the synthesis service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Voice {
    /// Deep, solemn
    #[default]
    Charon,
    Kore,
    Puck,
    Zephyr,
    Fenrir,
}

impl Voice {
    pub const ALL: [Voice; 5] = [
        Voice::Charon,
        Voice::Kore,
        Voice::Puck,
        Voice::Zephyr,
        Voice::Fenrir,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Voice::Charon => "Charon",
            Voice::Kore => "Kore",
            Voice::Puck => "Puck",
            Voice::Zephyr => "Zephyr",
            Voice::Fenrir => "Fenrir",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Voice {
    type Err = ResonanceError;

    fn from_str(s: &str) -> Result<Self> {
        Voice::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ResonanceError::invalid_parameter("voice", s, "Charon, Kore, Puck, Zephyr or Fenrir")
            })
    }
}

/// Delivery style requested from the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechStyle {
    /// Slow, solemn recitation
    #[default]
    Prayer,
    /// Rhythmic, repeated intonation
    Chant,
}

/// Remove characters the service rejects, cap the length and trim
///
/// Letters (accented ones included), digits, whitespace and basic
/// punctuation survive; everything else becomes a space.
pub fn sanitize_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || ".,!?;:_".contains(c) {
                c
            } else {
                ' '
            }
        })
        .take(MAX_TEXT_CHARS)
        .collect();
    cleaned.trim().to_string()
}

/// One synthesis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: Voice,
    pub style: SpeechStyle,
}

impl SynthesisRequest {
    /// Build a request from raw text; fails if nothing speakable is left
    pub fn new(text: &str, voice: Voice) -> Result<Self> {
        let text = sanitize_text(text);
        if text.is_empty() {
            return Err(ResonanceError::SynthesisFailed {
                reason: "text to synthesize is empty".to_string(),
            });
        }
        Ok(Self {
            text,
            voice,
            style: SpeechStyle::default(),
        })
    }

    pub fn with_style(mut self, style: SpeechStyle) -> Self {
        self.style = style;
        self
    }
}

/// User-facing speech preferences, persisted by the host application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpeechSettings {
    pub voice: Voice,
    pub auto_play: bool,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            voice: Voice::Charon,
            auto_play: true,
        }
    }
}

/// Source of synthesized speech
pub trait SpeechSynthesizer {
    /// Return the base64 PCM payload for `request`
    fn synthesize(&mut self, request: &SynthesisRequest) -> Result<String>;
}

impl<F> SpeechSynthesizer for F
where
    F: FnMut(&SynthesisRequest) -> Result<String>,
{
    fn synthesize(&mut self, request: &SynthesisRequest) -> Result<String> {
        self(request)
    }
}

/// Synthesizer that returns a payload previously saved to a file
#[derive(Debug, Clone)]
pub struct PayloadFile {
    path: PathBuf,
}

impl PayloadFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SpeechSynthesizer for PayloadFile {
    fn synthesize(&mut self, request: &SynthesisRequest) -> Result<String> {
        debug!(path = %self.path.display(), voice = %request.voice, "reading speech payload");
        fs::read_to_string(&self.path).map_err(|e| ResonanceError::SynthesisFailed {
            reason: format!("cannot read {}: {}", self.path.display(), e),
        })
    }
}
