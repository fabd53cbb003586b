//! WAV export and import
//!
//! Export always produces the canonical 44-byte header followed by 16-bit
//! PCM. Mono and stereo go through `hound`; wider layouts get the same
//! header written by hand. Import goes through `hound` and accepts the
//! common integer and float encodings.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::engine::buffer::AudioBuffer;
use crate::error::{ResonanceError, Result};

/// MIME type of exported audio
pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Size of the canonical RIFF/WAVE header
pub const WAV_HEADER_LEN: usize = 44;

const PCM_FORMAT_TAG: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Encoded WAV bytes ready for download or saving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavBlob {
    bytes: Vec<u8>,
}

impl WavBlob {
    /// MIME type of the blob
    pub fn mime_type(&self) -> &'static str {
        WAV_MIME_TYPE
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Convert one float sample to 16-bit PCM
///
/// Clamped to [-1, 1]; negatives scale by 32768, the rest by 32767, and the
/// result is truncated toward zero.
#[inline]
pub fn sample_to_pcm16(sample: f32) -> i16 {
    let clamped = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}

/// Encode a buffer as a canonical 16-bit PCM WAV file
pub fn encode_wav(buffer: &AudioBuffer) -> Result<WavBlob> {
    let channels = buffer.num_channels();
    // hound switches to WAVE_FORMAT_EXTENSIBLE above two channels and
    // rejects zero, so those layouts keep the 44-byte header written here
    if !(1..=2).contains(&channels) {
        return Ok(encode_canonical(buffer));
    }

    let spec = WavSpec {
        channels: channels as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };
    let frames = buffer.num_samples();
    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + frames * channels * 2));

    let mut writer = WavWriter::new(&mut cursor, spec).map_err(encode_error)?;
    for frame in 0..frames {
        for channel in &buffer.samples {
            writer
                .write_sample(sample_to_pcm16(channel[frame]))
                .map_err(encode_error)?;
        }
    }
    writer.finalize().map_err(encode_error)?;

    Ok(WavBlob {
        bytes: cursor.into_inner(),
    })
}

fn encode_error(e: hound::Error) -> ResonanceError {
    ResonanceError::InvalidAudio {
        reason: format!("Failed to encode WAV data: {}", e),
        source: Some(Box::new(e)),
    }
}

/// Plain RIFF/fmt/data layout for channel counts hound would not write as PCM
fn encode_canonical(buffer: &AudioBuffer) -> WavBlob {
    let channels = buffer.num_channels() as u16;
    let frames = buffer.num_samples();
    let block_align = channels as u32 * (BITS_PER_SAMPLE as u32 / 8);
    let data_len = frames as u32 * block_align;
    let total_len = WAV_HEADER_LEN + data_len as usize;

    let mut bytes = Vec::with_capacity(total_len);

    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(total_len as u32 - 8).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&PCM_FORMAT_TAG.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&buffer.sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(buffer.sample_rate * block_align).to_le_bytes());
    bytes.extend_from_slice(&(block_align as u16).to_le_bytes());
    bytes.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());

    for frame in 0..frames {
        for channel in &buffer.samples {
            bytes.extend_from_slice(&sample_to_pcm16(channel[frame]).to_le_bytes());
        }
    }

    WavBlob { bytes }
}

/// Write a buffer to disk as 16-bit PCM WAV
pub fn write_wav(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    std::fs::write(path, encode_wav(buffer)?.as_bytes())?;
    Ok(())
}

/// Decode WAV bytes into an audio buffer
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| ResonanceError::InvalidAudio {
        reason: format!("Failed to parse WAV data: {}", e),
        source: Some(Box::new(e)),
    })?;
    read_into_buffer(reader)
}

/// Read a WAV file from disk
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(ResonanceError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File not found: {}", path.display()),
        )));
    }

    let reader = WavReader::open(path).map_err(|e| ResonanceError::InvalidAudio {
        reason: format!("Failed to open WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;
    read_into_buffer(reader)
}

fn read_into_buffer<R: std::io::Read>(reader: WavReader<R>) -> Result<AudioBuffer> {
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(ResonanceError::UnsupportedFormat {
            format: "0-channel audio".to_string(),
        });
    }

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    AudioBuffer::from_interleaved(&interleaved, channels, spec.sample_rate)
}

/// Read samples from a WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    fn invalid(bits: u16) -> impl Fn(hound::Error) -> ResonanceError {
        move |e| ResonanceError::InvalidAudio {
            reason: format!("Failed to read {}-bit samples: {}", bits, e),
            source: Some(Box::new(e)),
        }
    }

    match (sample_format, bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid(32)),
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid(8)),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid(16)),
        // 24-bit is stored as i32 in hound
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid(24)),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid(32)),
        (format, bits) => Err(ResonanceError::UnsupportedFormat {
            format: format!("{}-bit {:?} audio", bits, format),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================
