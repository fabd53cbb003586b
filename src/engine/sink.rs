//! Audio output sinks
//!
//! The rendering context pushes every finished block to an [`AudioSink`].
//! Sinks stand in for the output device: opening one is what "resuming" the
//! context means, and a sink that fails to open is reported as an
//! unavailable device.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, warn};

use super::buffer::AudioBuffer;
use super::wav::sample_to_pcm16;
use crate::error::{ResonanceError, Result};

/// Destination for rendered audio blocks
pub trait AudioSink: Send {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Prepare to receive blocks; called on every resume
    fn open(&mut self, sample_rate: u32, channels: usize) -> Result<()>;

    /// Accept one rendered block
    fn write(&mut self, block: &AudioBuffer) -> Result<()>;

    /// Flush and release the device; called when the context closes
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Null Sink
// ============================================================================

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    fn open(&mut self, _sample_rate: u32, _channels: usize) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, _block: &AudioBuffer) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Memory Sink
// ============================================================================

/// Captures output in memory
///
/// Clones share the same capture, so a test can keep one handle while the
/// context owns the other.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    captured: Arc<Mutex<AudioBuffer>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AudioBuffer> {
        // Keep capturing even if a writer panicked
        self.captured
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of everything captured so far
    pub fn snapshot(&self) -> AudioBuffer {
        self.lock().clone()
    }

    /// Captured length in seconds
    pub fn duration_secs(&self) -> f64 {
        self.lock().duration_secs()
    }

    /// Drop everything captured so far
    pub fn reset(&self) {
        let mut captured = self.lock();
        let channels = captured.num_channels();
        let rate = captured.sample_rate;
        *captured = AudioBuffer::new(channels, 0, rate);
    }
}

impl AudioSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(&mut self, sample_rate: u32, channels: usize) -> Result<()> {
        let mut captured = self.lock();
        if captured.is_empty() {
            *captured = AudioBuffer::new(channels, 0, sample_rate);
        }
        Ok(())
    }

    fn write(&mut self, block: &AudioBuffer) -> Result<()> {
        self.lock().append(block)
    }
}

// ============================================================================
// WAV File Sink
// ============================================================================

/// Streams output into a 16-bit WAV file
pub struct WavFileSink {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    frames_written: u64,
}

impl std::fmt::Debug for WavFileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavFileSink")
            .field("path", &self.path)
            .field("open", &self.writer.is_some())
            .field("frames_written", &self.frames_written)
            .finish()
    }
}

impl WavFileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
            frames_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl AudioSink for WavFileSink {
    fn name(&self) -> &str {
        "wav_file"
    }

    fn open(&mut self, sample_rate: u32, channels: usize) -> Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }

        let spec = WavSpec {
            channels: channels as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(&self.path, spec).map_err(|e| {
            ResonanceError::DeviceUnavailable {
                reason: format!("cannot create {}: {}", self.path.display(), e),
            }
        })?;

        debug!(path = %self.path.display(), sample_rate, channels, "wav sink opened");
        self.writer = Some(writer);
        Ok(())
    }

    fn write(&mut self, block: &AudioBuffer) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ResonanceError::DeviceUnavailable {
                reason: "wav sink written before it was opened".to_string(),
            })?;

        for sample in block.to_interleaved() {
            writer
                .write_sample(sample_to_pcm16(sample))
                .map_err(|e| ResonanceError::InvalidAudio {
                    reason: format!("failed to write {}", self.path.display()),
                    source: Some(Box::new(e)),
                })?;
        }
        self.frames_written += block.num_samples() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| ResonanceError::InvalidAudio {
                reason: format!("failed to finalize {}", self.path.display()),
                source: Some(Box::new(e)),
            })?;
            debug!(path = %self.path.display(), frames = self.frames_written, "wav sink closed");
        }
        Ok(())
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "wav sink not finalized cleanly");
        }
    }
}
