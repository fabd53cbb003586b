//! Audio Engine Module
//!
//! Core playback engine including:
//! - Audio buffers, PCM payload decoding and WAV encoding
//! - The offline rendering context and its output sinks
//! - Target frequency parsing
//! - The transport state machine driving each playback session

pub mod buffer;
pub mod context;
pub mod frequency;
pub mod pcm;
pub mod sink;
pub mod transport;
pub mod wav;

pub use buffer::{calculate_rms, db_to_linear, linear_to_db, AudioBuffer};
pub use context::{AudioContext, ContextState, OUTPUT_CHANNELS};
pub use frequency::{RitualPhase, TargetFrequency, DEFAULT_TARGET_HZ};
pub use pcm::{decode_base64_pcm, decode_pcm16};
pub use sink::{AudioSink, MemorySink, NullSink, WavFileSink};
pub use transport::{
    format_clock, PlayRequest, PlaybackSession, Resonator, TransportEvent, TransportState,
};
pub use wav::{decode_wav, encode_wav, read_wav, write_wav, WavBlob, WAV_MIME_TYPE};
