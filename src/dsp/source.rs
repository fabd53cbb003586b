//! Buffer playback source and noise generation
//!
//! A [`BufferSource`] plays a shared, read-only [`AudioBuffer`] from an
//! offset, converting its sample rate to the context rate by linear
//! interpolation. Multi-channel buffers are folded to mono.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::trace;

use super::node::{Lifecycle, Node};
use crate::engine::buffer::AudioBuffer;
use crate::error::Result;

/// Generate a mono buffer of uniform white noise in [-1, 1)
pub fn noise_buffer(seconds: f64, sample_rate: u32, rng: &mut StdRng) -> AudioBuffer {
    let len = (seconds * sample_rate as f64).round().max(1.0) as usize;
    let samples = (0..len).map(|_| rng.gen_range(-1.0_f32..1.0)).collect();
    AudioBuffer::from_mono(samples, sample_rate)
}

/// Node that plays an audio buffer once or in a loop
#[derive(Debug, Clone)]
pub struct BufferSource {
    buffer: Arc<AudioBuffer>,
    looping: bool,
    /// Read position in source frames
    position: f64,
    ended: bool,
    lifecycle: Lifecycle,
}

impl BufferSource {
    pub fn new(buffer: Arc<AudioBuffer>) -> Self {
        Self {
            buffer,
            looping: false,
            position: 0.0,
            ended: false,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Loop the buffer forever instead of ending
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }

    /// Start at audio-clock `when`, reading from `offset` seconds into the buffer
    pub fn start_at(&mut self, when: f64, offset: f64) -> Result<()> {
        self.start(when)?;
        let max = self.buffer.num_samples() as f64;
        self.position = (offset.max(0.0) * self.buffer.sample_rate as f64).min(max);
        Ok(())
    }

    /// Whether playback ran off the end of a non-looping buffer
    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Current read position in seconds
    pub fn position_secs(&self) -> f64 {
        if self.buffer.sample_rate == 0 {
            return 0.0;
        }
        self.position / self.buffer.sample_rate as f64
    }

    /// Render one block starting at audio-clock `start_time`; overwrites `out`
    pub fn render(&mut self, start_time: f64, sample_rate: u32, out: &mut [f32]) {
        let len = self.buffer.num_samples();
        let sr = sample_rate as f64;
        let step = self.buffer.sample_rate as f64 / sr;

        for (i, sample) in out.iter_mut().enumerate() {
            let t = start_time + i as f64 / sr;
            if self.ended || len == 0 || !self.lifecycle.is_sounding_at(t) {
                *sample = 0.0;
                continue;
            }

            if self.position >= len as f64 {
                if self.looping {
                    self.position %= len as f64;
                } else {
                    self.finish();
                    *sample = 0.0;
                    continue;
                }
            }

            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            let current = self.buffer.frame_mono(index);
            let next = if index + 1 < len {
                self.buffer.frame_mono(index + 1)
            } else if self.looping {
                self.buffer.frame_mono(0)
            } else {
                current
            };

            *sample = current + (next - current) * frac;
            self.position += step;
        }
    }

    fn finish(&mut self) {
        self.ended = true;
        self.lifecycle.stop();
        trace!(frames = self.buffer.num_samples(), "buffer source ended");
    }
}

impl Node for BufferSource {
    fn kind(&self) -> &'static str {
        "buffer_source"
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}
