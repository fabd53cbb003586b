//! Audio Buffer Management
//!
//! Provides the in-memory audio buffer shared between the decoder, the
//! playback graph and the WAV exporter, plus level helpers used by tests
//! and the CLI.

use crate::error::{ResonanceError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Sample rate of speech returned by the synthesis service
pub const SPEECH_SAMPLE_RATE: u32 = 24000;

/// Channel count of speech returned by the synthesis service
pub const SPEECH_CHANNELS: usize = 1;

/// Default output rate of the rendering context
pub const DEFAULT_CONTEXT_SAMPLE_RATE: u32 = 48000;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the RMS level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty or silent buffers.
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.num_channels() * buffer.num_samples();
    if total_samples == 0 {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let rms = (sum_squares / total_samples as f64).sqrt() as f32;
    linear_to_db(rms)
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Fixed-length multi-channel buffer of floating point samples
///
/// Stores audio as non-interleaved 32-bit floats, one `Vec<f32>` per channel.
/// Buffers handed to playback are wrapped in an `Arc` and never mutated.
///
/// # Example
/// ```
/// use resonance::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::new(1, 24000, 24000);
/// assert_eq!(buffer.num_channels(), 1);
/// assert_eq!(buffer.duration_secs(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a zeroed buffer
    pub fn new(num_channels: usize, num_samples: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; num_channels],
            sample_rate,
        }
    }

    /// Create a mono buffer from existing samples
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: vec![samples],
            sample_rate,
        }
    }

    /// Create an audio buffer from interleaved sample data
    ///
    /// Fails if the data length is not divisible by the channel count.
    pub fn from_interleaved(interleaved: &[f32], num_channels: usize, sample_rate: u32) -> Result<Self> {
        if num_channels == 0 {
            return Err(ResonanceError::invalid_parameter(
                "channels",
                num_channels,
                "at least 1 channel",
            ));
        }

        if interleaved.len() % num_channels != 0 {
            return Err(ResonanceError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ... for stereo)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_channels = self.num_channels();
        let num_samples = self.num_samples();

        let mut interleaved = Vec::with_capacity(num_channels * num_samples);
        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }

        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel (frame count)
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer holds no frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_samples() as f64 / self.sample_rate as f64
    }

    /// Immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Get a sample, or None if out of bounds
    #[inline]
    pub fn get_sample(&self, channel: usize, index: usize) -> Option<f32> {
        self.samples
            .get(channel)
            .and_then(|ch| ch.get(index).copied())
    }

    /// Mono view of one frame: the average across channels
    #[inline]
    pub fn frame_mono(&self, index: usize) -> f32 {
        let channels = self.num_channels();
        if channels == 0 {
            return 0.0;
        }
        let sum: f32 = self
            .samples
            .iter()
            .map(|ch| ch.get(index).copied().unwrap_or(0.0))
            .sum();
        sum / channels as f32
    }

    /// Absolute peak sample value across all channels
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Set every sample to zero, keeping the length
    pub fn clear(&mut self) {
        for channel in &mut self.samples {
            channel.iter_mut().for_each(|s| *s = 0.0);
        }
    }

    /// Append the frames of another buffer with the same channel count
    pub fn append(&mut self, other: &AudioBuffer) -> Result<()> {
        if self.num_channels() != other.num_channels() {
            return Err(ResonanceError::InvalidAudio {
                reason: format!(
                    "Cannot append {}-channel audio to a {}-channel buffer",
                    other.num_channels(),
                    self.num_channels()
                ),
                source: None,
            });
        }
        for (dst, src) in self.samples.iter_mut().zip(&other.samples) {
            dst.extend_from_slice(src);
        }
        Ok(())
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(1, 0, SPEECH_SAMPLE_RATE)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_to_linear() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(-6.0206) - 0.5).abs() < 1e-4);
        assert!((db_to_linear(12.0) - 3.981).abs() < 1e-3);
    }

    #[test]
    fn test_linear_to_db() {
        assert!((linear_to_db(1.0) - 0.0).abs() < 1e-6);
        assert!((linear_to_db(0.1) - (-20.0)).abs() < 1e-4);
        assert!(linear_to_db(0.0).is_infinite() && linear_to_db(0.0).is_sign_negative());
    }

    #[test]
    fn test_calculate_rms_silence() {
        let buffer = AudioBuffer::new(1, 1000, SPEECH_SAMPLE_RATE);
        let rms = calculate_rms(&buffer);
        assert!(rms.is_infinite() && rms.is_sign_negative());
    }

    #[test]
    fn test_calculate_rms_unity() {
        let buffer = AudioBuffer::from_mono(vec![1.0; 1000], SPEECH_SAMPLE_RATE);
        assert!(calculate_rms(&buffer).abs() < 0.01);
    }

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer::new(1, 72000, SPEECH_SAMPLE_RATE);
        assert!((buffer.duration_secs() - 3.0).abs() < 1e-9);

        let no_rate = AudioBuffer::new(1, 100, 0);
        assert_eq!(no_rate.duration_secs(), 0.0);
    }

    #[test]
    fn test_interleave_roundtrip() {
        let interleaved = vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3];
        let buffer = AudioBuffer::from_interleaved(&interleaved, 2, 48000).unwrap();
        assert_eq!(buffer.num_channels(), 2);
        assert_eq!(buffer.num_samples(), 3);
        assert_eq!(buffer.channel(1), &[-0.1, -0.2, -0.3]);
        assert_eq!(buffer.to_interleaved(), interleaved);
    }

    #[test]
    fn test_from_interleaved_rejects_partial_frame() {
        let result = AudioBuffer::from_interleaved(&[0.0, 0.1, 0.2], 2, 48000);
        assert!(result.is_err());
    }

    #[test]
    fn test_peak_and_frame_mono() {
        let buffer = AudioBuffer::from_interleaved(&[0.5, -0.9, 0.25, 0.25], 2, 48000).unwrap();
        assert_eq!(buffer.peak(), 0.9);
        assert!((buffer.frame_mono(0) - (-0.2)).abs() < 1e-6);
        assert_eq!(buffer.frame_mono(5), 0.0);
    }

    #[test]
    fn test_append_checks_channels() {
        let mut stereo = AudioBuffer::new(2, 10, 48000);
        let mono = AudioBuffer::new(1, 10, 48000);
        assert!(stereo.append(&mono).is_err());

        let more = AudioBuffer::new(2, 5, 48000);
        stereo.append(&more).unwrap();
        assert_eq!(stereo.num_samples(), 15);
    }
}
