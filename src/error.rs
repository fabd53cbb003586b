//! Error handling for the resonance engine
//!
//! Every failure the engine can report carries an error code and, where it
//! makes sense, recovery suggestions for the UI layer.

use thiserror::Error;

/// Result type alias for resonance operations
pub type Result<T> = std::result::Result<T, ResonanceError>;

/// Main error type for resonance operations
#[derive(Error, Debug)]
pub enum ResonanceError {
    // Decode Errors
    #[error("Speech payload is empty")]
    EmptyPayload,

    #[error("Speech payload is not valid base64: {reason}")]
    InvalidBase64 {
        reason: String,
        #[source]
        source: Option<base64::DecodeError>,
    },

    #[error("PCM payload of {len} bytes is not a whole number of {frame_bytes}-byte frames")]
    MisalignedPcm { len: usize, frame_bytes: usize },

    #[error("Invalid audio: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // Collaborator Errors
    #[error("Speech synthesis failed: {reason}")]
    SynthesisFailed { reason: String },

    // Device Errors
    #[error("Playback device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    #[error("Audio context has been closed")]
    ContextClosed,

    // Transport Errors
    #[error("Transport is busy loading audio; '{operation}' is disabled")]
    TransportBusy { operation: String },

    #[error("No audio loaded")]
    NoAudioLoaded,

    #[error("Node '{node}' cannot {operation} while {state}")]
    InvalidNodeState {
        node: String,
        operation: String,
        state: String,
    },

    // Parameter Errors
    #[error("Invalid parameter '{param}': {value} (expected {expected})")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ResonanceError {
    /// Shorthand for an `InvalidParameter` error
    pub fn invalid_parameter(
        param: impl Into<String>,
        value: impl ToString,
        expected: impl Into<String>,
    ) -> Self {
        ResonanceError::InvalidParameter {
            param: param.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ResonanceError::EmptyPayload => "EMPTY_PAYLOAD",
            ResonanceError::InvalidBase64 { .. } => "INVALID_BASE64",
            ResonanceError::MisalignedPcm { .. } => "MISALIGNED_PCM",
            ResonanceError::InvalidAudio { .. } => "INVALID_AUDIO",
            ResonanceError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            ResonanceError::SynthesisFailed { .. } => "SYNTHESIS_FAILED",
            ResonanceError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            ResonanceError::ContextClosed => "CONTEXT_CLOSED",
            ResonanceError::TransportBusy { .. } => "TRANSPORT_BUSY",
            ResonanceError::NoAudioLoaded => "NO_AUDIO_LOADED",
            ResonanceError::InvalidNodeState { .. } => "INVALID_NODE_STATE",
            ResonanceError::InvalidParameter { .. } => "INVALID_PARAMETER",
            ResonanceError::Io(_) => "IO_ERROR",
            ResonanceError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if retrying the operation can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ResonanceError::SynthesisFailed { .. }
                | ResonanceError::DeviceUnavailable { .. }
                | ResonanceError::TransportBusy { .. }
                | ResonanceError::EmptyPayload
                | ResonanceError::InvalidBase64 { .. }
                | ResonanceError::MisalignedPcm { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ResonanceError::EmptyPayload
            | ResonanceError::InvalidBase64 { .. }
            | ResonanceError::MisalignedPcm { .. } => vec![
                "Request the speech synthesis again",
                "Check that the service returns 16-bit PCM audio",
            ],
            ResonanceError::SynthesisFailed { .. } => vec![
                "Try again in a few seconds",
                "Try a different voice",
                "Shorten the text being synthesized",
            ],
            ResonanceError::DeviceUnavailable { .. } => vec![
                "Interact with the page to allow audio playback",
                "Check that an output device is connected",
            ],
            ResonanceError::TransportBusy { .. } => {
                vec!["Wait for the current synthesis to finish"]
            }
            ResonanceError::UnsupportedFormat { .. } => vec![
                "Convert the file to 16-bit PCM WAV",
                "Supported formats: 8/16/24/32-bit integer or 32-bit float WAV",
            ],
            _ => vec![],
        }
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            ResonanceError::SynthesisFailed { reason } => {
                format!("The voice could not be generated this time: {}. Want to try again?", reason)
            }
            ResonanceError::DeviceUnavailable { .. } => {
                "Audio playback is blocked right now. Press play again after interacting with the page."
                    .to_string()
            }
            ResonanceError::TransportBusy { .. } => {
                "Still tuning in. Controls come back once the voice has loaded.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ResonanceError::MisalignedPcm {
            len: 3,
            frame_bytes: 2,
        };
        assert_eq!(err.error_code(), "MISALIGNED_PCM");
        assert_eq!(ResonanceError::ContextClosed.error_code(), "CONTEXT_CLOSED");
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = ResonanceError::DeviceUnavailable {
            reason: "suspended".to_string(),
        };
        assert!(!err.recovery_suggestions().is_empty());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_invalid_parameter_message() {
        let err = ResonanceError::invalid_parameter("q", 0.0, "0.1 to 30");
        assert_eq!(err.to_string(), "Invalid parameter 'q': 0 (expected 0.1 to 30)");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_friendly_message_falls_back_to_display() {
        let err = ResonanceError::NoAudioLoaded;
        assert_eq!(err.friendly_message(), "No audio loaded");
    }
}
