//! Periodic oscillator node
//!
//! Generates sine or triangle waves with phase tracked across blocks.
//! Frequency is an [`AudioParam`] so it can be ramped, and a fixed detune in
//! cents scales it the same way browser oscillators do.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use super::node::{Lifecycle, Node};
use super::param::AudioParam;

/// Waveform types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
}

impl Waveform {
    /// Value of the waveform at `phase` in [0, 1)
    ///
    /// Both shapes start at zero and rise, so a freshly started oscillator
    /// never clicks.
    #[inline]
    pub fn sample(self, phase: f64) -> f64 {
        match self {
            Waveform::Sine => (phase * TAU).sin(),
            Waveform::Triangle => {
                if phase < 0.25 {
                    4.0 * phase
                } else if phase < 0.75 {
                    2.0 - 4.0 * phase
                } else {
                    4.0 * phase - 4.0
                }
            }
        }
    }
}

/// Oscillator node
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    /// Fundamental frequency in Hz
    pub frequency: AudioParam,
    detune_cents: f64,
    phase: f64,
    lifecycle: Lifecycle,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f64) -> Self {
        Self {
            waveform,
            frequency: AudioParam::with_range(frequency, 0.0, f64::MAX),
            detune_cents: 0.0,
            phase: 0.0,
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn sine(frequency: f64) -> Self {
        Self::new(Waveform::Sine, frequency)
    }

    pub fn with_detune(mut self, cents: f64) -> Self {
        self.detune_cents = cents;
        self
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn detune_cents(&self) -> f64 {
        self.detune_cents
    }

    /// Effective frequency at `time`, detune applied
    pub fn frequency_at(&self, time: f64) -> f64 {
        self.frequency.value_at(time) * (self.detune_cents / 1200.0).exp2()
    }

    /// Render one block starting at audio-clock `start_time`
    ///
    /// Overwrites `out`. Frames before the start time or after a scheduled
    /// stop are silent and do not advance the phase.
    pub fn render(&mut self, start_time: f64, sample_rate: u32, out: &mut [f32]) {
        let sr = sample_rate as f64;
        for (i, sample) in out.iter_mut().enumerate() {
            let t = start_time + i as f64 / sr;
            if !self.lifecycle.is_sounding_at(t) {
                *sample = 0.0;
                continue;
            }

            *sample = self.waveform.sample(self.phase) as f32;
            self.phase += self.frequency_at(t) / sr;
            self.phase -= self.phase.floor();
        }
    }
}

impl Node for Oscillator {
    fn kind(&self) -> &'static str {
        "oscillator"
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}
