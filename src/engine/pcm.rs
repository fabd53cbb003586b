//! Speech payload decoding
//!
//! The synthesis service returns headerless, interleaved, signed 16-bit
//! little-endian PCM encoded as base64. Payloads whose byte length is not a
//! whole number of frames are rejected; no partial buffer is ever produced.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::engine::buffer::AudioBuffer;
use crate::error::{ResonanceError, Result};

/// Scale between the 16-bit integer domain and [-1, 1]
pub const PCM16_SCALE: f32 = 32768.0;

/// Decode a base64 speech payload into an audio buffer
///
/// Surrounding whitespace and line breaks inside the payload are ignored.
pub fn decode_base64_pcm(payload: &str, sample_rate: u32, channels: usize) -> Result<AudioBuffer> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ResonanceError::EmptyPayload);
    }

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ResonanceError::InvalidBase64 {
            reason: e.to_string(),
            source: Some(e),
        })?;

    decode_pcm16(&bytes, sample_rate, channels)
}

/// Decode interleaved signed 16-bit little-endian PCM
///
/// Each sample is divided by 32768, so the full integer range maps onto
/// [-1.0, 32767/32768].
///
/// # Example
/// ```
/// use resonance::engine::pcm::decode_pcm16;
///
/// let buffer = decode_pcm16(&[0x00, 0x80, 0xFF, 0x7F], 24000, 1).unwrap();
/// assert_eq!(buffer.channel(0)[0], -1.0);
/// assert!((buffer.channel(0)[1] - 0.99997).abs() < 1e-5);
/// ```
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: usize) -> Result<AudioBuffer> {
    if channels == 0 {
        return Err(ResonanceError::invalid_parameter(
            "channels",
            channels,
            "at least 1 channel",
        ));
    }
    if sample_rate == 0 {
        return Err(ResonanceError::invalid_parameter(
            "sample_rate",
            sample_rate,
            "a positive sample rate",
        ));
    }
    if bytes.is_empty() {
        return Err(ResonanceError::EmptyPayload);
    }

    let frame_bytes = channels * 2;
    if bytes.len() % frame_bytes != 0 {
        return Err(ResonanceError::MisalignedPcm {
            len: bytes.len(),
            frame_bytes,
        });
    }

    let frame_count = bytes.len() / frame_bytes;
    let mut samples = vec![Vec::with_capacity(frame_count); channels];

    for frame in bytes.chunks_exact(frame_bytes) {
        for (ch, pair) in frame.chunks_exact(2).enumerate() {
            let value = i16::from_le_bytes([pair[0], pair[1]]);
            samples[ch].push(value as f32 / PCM16_SCALE);
        }
    }

    Ok(AudioBuffer {
        samples,
        sample_rate,
    })
}
