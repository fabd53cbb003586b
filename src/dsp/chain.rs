//! Resonance effects chain
//!
//! Signal flow for one playback session:
//!
//! ```text
//! source -> peaking filter -> compressor -> output
//!              ^ frequency
//! LFO -> depth gain
//! ```
//!
//! The peaking filter boosts a narrow band at the target frequency, the slow
//! LFO sweeps that band by a few hertz for a shimmering effect, and the
//! compressor adds density. A chain lives for exactly one session.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::biquad::BiquadFilter;
use super::compressor::{Compressor, CompressorParams};
use super::graph::SignalGraph;
use super::mix::GainNode;
use super::node::Node;
use super::oscillator::Oscillator;
use super::source::BufferSource;
use crate::engine::buffer::AudioBuffer;
use crate::error::{ResonanceError, Result};

/// Offset kept clear of the end of the buffer when starting playback
pub const START_EPSILON_SECS: f64 = 0.1;

// ============================================================================
// Parameters
// ============================================================================

/// Tuning of the resonance chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResonanceParams {
    /// Peaking filter Q (0.1 to 30)
    pub q: f64,
    /// Peaking filter boost in dB (-40 to 40)
    pub gain_db: f64,
    /// Shimmer LFO rate in Hz (0.5 to 0.8)
    pub lfo_rate_hz: f64,
    /// Shimmer depth in Hz added to the filter centre (0 to 200)
    pub lfo_depth_hz: f64,
    /// Density stage
    pub compressor: CompressorParams,
}

impl Default for ResonanceParams {
    fn default() -> Self {
        Self {
            q: 10.0,
            gain_db: 12.0,
            lfo_rate_hz: 0.8,
            lfo_depth_hz: 20.0,
            compressor: CompressorParams::default(),
        }
    }
}

impl ResonanceParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.1..=30.0).contains(&self.q) {
            return Err(ResonanceError::invalid_parameter("q", self.q, "0.1 to 30"));
        }
        if !(-40.0..=40.0).contains(&self.gain_db) {
            return Err(ResonanceError::invalid_parameter("gain_db", self.gain_db, "-40 to 40 dB"));
        }
        if !(0.5..=0.8).contains(&self.lfo_rate_hz) {
            return Err(ResonanceError::invalid_parameter(
                "lfo_rate_hz",
                self.lfo_rate_hz,
                "0.5 to 0.8 Hz",
            ));
        }
        if !(0.0..=200.0).contains(&self.lfo_depth_hz) {
            return Err(ResonanceError::invalid_parameter(
                "lfo_depth_hz",
                self.lfo_depth_hz,
                "0 to 200 Hz",
            ));
        }
        self.compressor.validate()
    }
}

/// Clamp a requested start offset into `[0, duration - epsilon]`
///
/// Buffers shorter than `epsilon` always start from 0.
pub fn clamp_start_offset(offset: f64, duration: f64, epsilon: f64) -> f64 {
    let latest = (duration - epsilon).max(0.0);
    if offset.is_nan() {
        return 0.0;
    }
    offset.clamp(0.0, latest)
}

// ============================================================================
// Chain
// ============================================================================

/// The voice graph of one playback session
#[derive(Debug)]
pub struct ResonanceChain {
    source: BufferSource,
    filter: BiquadFilter,
    lfo: Oscillator,
    lfo_depth: GainNode,
    compressor: Compressor,
    target_hz: f64,
    start_offset: f64,
    started_at: f64,
    voice: Vec<f32>,
    shimmer: Vec<f32>,
}

impl ResonanceChain {
    /// Build and start the chain
    ///
    /// Playback of `buffer` begins at audio-clock `when`, reading from
    /// `offset` seconds (already clamped by the caller). `sample_rate` is the
    /// context rate.
    pub fn build(
        buffer: Arc<AudioBuffer>,
        target_hz: f64,
        offset: f64,
        when: f64,
        params: &ResonanceParams,
        sample_rate: u32,
    ) -> Result<Self> {
        if buffer.is_empty() {
            return Err(ResonanceError::NoAudioLoaded);
        }
        if !target_hz.is_finite() || target_hz <= 0.0 {
            return Err(ResonanceError::invalid_parameter(
                "target_hz",
                target_hz,
                "a positive frequency",
            ));
        }

        let offset = offset.clamp(0.0, buffer.duration_secs());

        let mut source = BufferSource::new(buffer);
        let mut filter = BiquadFilter::peaking(target_hz, params.q, params.gain_db);
        let mut lfo = Oscillator::sine(params.lfo_rate_hz);
        let mut lfo_depth = GainNode::new(params.lfo_depth_hz);
        let mut compressor = Compressor::new(params.compressor.clone(), sample_rate);

        filter.start(when)?;
        compressor.start(when)?;
        lfo_depth.start(when)?;
        lfo.start(when)?;
        source.start_at(when, offset)?;

        debug!(target_hz, offset, when, "resonance chain built");

        Ok(Self {
            source,
            filter,
            lfo,
            lfo_depth,
            compressor,
            target_hz,
            start_offset: offset,
            started_at: when,
            voice: Vec::new(),
            shimmer: Vec::new(),
        })
    }

    pub fn target_hz(&self) -> f64 {
        self.target_hz
    }

    /// Buffer offset playback started from, in seconds
    pub fn start_offset(&self) -> f64 {
        self.start_offset
    }

    /// Audio-clock time playback started at
    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    /// Whether the source has played to the end of its buffer
    pub fn source_ended(&self) -> bool {
        self.source.has_ended()
    }

    fn nodes(&self) -> [&dyn Node; 5] {
        [
            &self.source,
            &self.filter,
            &self.lfo,
            &self.lfo_depth,
            &self.compressor,
        ]
    }
}

impl SignalGraph for ResonanceChain {
    fn label(&self) -> &str {
        "resonance"
    }

    fn render(&mut self, start_time: f64, out: &mut AudioBuffer) {
        let frames = out.num_samples();
        let sample_rate = out.sample_rate;
        self.voice.resize(frames, 0.0);
        self.shimmer.resize(frames, 0.0);

        self.source.render(start_time, sample_rate, &mut self.voice);

        // Filter frequency modulation is evaluated once per block
        self.lfo.render(start_time, sample_rate, &mut self.shimmer);
        self.lfo_depth.process(start_time, sample_rate, &mut self.shimmer);
        let shimmer = self.shimmer.first().copied().unwrap_or(0.0) as f64;

        self.filter.process(start_time, sample_rate, shimmer, &mut self.voice);
        self.compressor.process(&mut self.voice);

        for channel in out.samples.iter_mut() {
            for (dst, &src) in channel.iter_mut().zip(&self.voice) {
                *dst += src;
            }
        }
    }

    fn release(&mut self, _now: f64) {
        // Voice has no tail; releasing stops it outright
        self.teardown();
    }

    fn teardown(&mut self) {
        self.source.teardown();
        self.lfo.teardown();
        self.lfo_depth.teardown();
        self.filter.teardown();
        self.compressor.teardown();
        trace!(target_hz = self.target_hz, "resonance chain torn down");
    }

    fn active_nodes(&self) -> usize {
        self.nodes().iter().filter(|n| n.is_active()).count()
    }

    fn is_finished(&self) -> bool {
        self.source.has_ended() || self.active_nodes() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::graph::render_graph;
    use approx::assert_abs_diff_eq;

    fn tone(freq: f64, seconds: f64, sample_rate: u32) -> Arc<AudioBuffer> {
        let len = (seconds * sample_rate as f64) as usize;
        let samples = (0..len)
            .map(|i| {
                (0.3 * (std::f64::consts::TAU * freq * i as f64 / sample_rate as f64).sin()) as f32
            })
            .collect();
        Arc::new(AudioBuffer::from_mono(samples, sample_rate))
    }

    #[test]
    fn test_clamp_start_offset() {
        assert_abs_diff_eq!(clamp_start_offset(5.0, 3.0, 0.1), 2.9, epsilon = 1e-12);
        assert_eq!(clamp_start_offset(-1.0, 3.0, 0.1), 0.0);
        assert_eq!(clamp_start_offset(1.5, 3.0, 0.1), 1.5);
        // Shorter than epsilon: always from the top
        assert_eq!(clamp_start_offset(0.04, 0.05, 0.1), 0.0);
        assert_eq!(clamp_start_offset(f64::NAN, 3.0, 0.1), 0.0);
    }

    #[test]
    fn test_default_params_validate() {
        assert!(ResonanceParams::default().validate().is_ok());
        let params = ResonanceParams {
            lfo_rate_hz: 2.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_build_starts_all_nodes() {
        let chain = ResonanceChain::build(
            tone(440.0, 0.5, 24000),
            432.0,
            0.0,
            0.0,
            &ResonanceParams::default(),
            48000,
        )
        .unwrap();
        assert_eq!(chain.active_nodes(), 5);
        assert!(!chain.is_finished());
    }

    #[test]
    fn test_rejects_empty_buffer() {
        let empty = Arc::new(AudioBuffer::new(1, 0, 24000));
        let result =
            ResonanceChain::build(empty, 432.0, 0.0, 0.0, &ResonanceParams::default(), 48000);
        assert!(matches!(result, Err(ResonanceError::NoAudioLoaded)));
    }

    #[test]
    fn test_output_is_non_silent_and_mirrored() {
        let mut chain = ResonanceChain::build(
            tone(528.0, 0.5, 24000),
            528.0,
            0.0,
            0.0,
            &ResonanceParams::default(),
            48000,
        )
        .unwrap();
        let out = render_graph(&mut chain, 48000, 0.4);
        assert!(out.peak() > 0.05);
        assert!(out.is_finite());
        assert_eq!(out.channel(0), out.channel(1));
    }

    #[test]
    fn test_finishes_when_source_runs_out() {
        let mut chain = ResonanceChain::build(
            tone(440.0, 0.1, 24000),
            432.0,
            0.0,
            0.0,
            &ResonanceParams::default(),
            48000,
        )
        .unwrap();
        let mut block = AudioBuffer::new(2, 128, 48000);
        let mut t = 0.0;
        while t < 0.2 {
            chain.render(t, &mut block);
            t += 128.0 / 48000.0;
        }
        assert!(chain.source_ended());
        assert!(chain.is_finished());
    }

    #[test]
    fn test_teardown_leaves_no_active_nodes() {
        let mut chain = ResonanceChain::build(
            tone(440.0, 0.5, 24000),
            432.0,
            0.0,
            0.0,
            &ResonanceParams::default(),
            48000,
        )
        .unwrap();
        chain.teardown();
        chain.teardown();
        assert_eq!(chain.active_nodes(), 0);
    }
}
