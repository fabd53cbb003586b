//! Ambient drone ("zen engine")
//!
//! A sustained bed tuned to the target frequency:
//!
//! - looped white noise through a low-pass whose cutoff drifts with a very
//!   slow LFO (wind / earth tone)
//! - sine partials at multiples of the target, each with its own slow pulse
//!   LFO on its amplitude, a small random detune and a random pan position
//! - a master gain that fades in on start and fades out on release
//!
//! Every node is owned by the drone and stopped together, so one call
//! silences the whole layer.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::biquad::BiquadFilter;
use super::graph::SignalGraph;
use super::mix::{GainNode, StereoPanner};
use super::node::Node;
use super::oscillator::Oscillator;
use super::source::{noise_buffer, BufferSource};
use crate::engine::buffer::AudioBuffer;
use crate::error::{ResonanceError, Result};

// ============================================================================
// Parameters
// ============================================================================

/// Drone configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DroneParams {
    /// Master level once faded in (0 to 1)
    pub level: f64,
    /// Fade-in time in seconds
    pub fade_in_secs: f64,
    /// Fade-out time in seconds
    pub fade_out_secs: f64,
    /// Partial frequencies as multiples of the target
    pub partials: Vec<f64>,
    /// Gain of the first partial; partial `i` gets `partial_gain / (i + 1)`
    pub partial_gain: f64,
    /// Pulse LFO rate of the first partial in Hz
    pub pulse_rate_hz: f64,
    /// Each further partial pulses this fraction faster than the first
    pub pulse_rate_spread: f64,
    /// Pulse depth (0 = steady, 1 = fully pulsing to silence)
    pub pulse_depth: f64,
    /// Maximum random detune in cents, either direction
    pub detune_cents: f64,
    /// Maximum random pan offset from centre
    pub pan_spread: f64,
    /// Length of the looped noise buffer in seconds
    pub noise_secs: f64,
    /// Noise low-pass cutoff in Hz
    pub noise_cutoff_hz: f64,
    /// Cutoff drift LFO rate in Hz
    pub noise_lfo_rate_hz: f64,
    /// Cutoff drift depth in Hz
    pub noise_lfo_depth_hz: f64,
}

impl Default for DroneParams {
    fn default() -> Self {
        Self {
            level: 0.04,
            fade_in_secs: 2.0,
            fade_out_secs: 2.0,
            partials: vec![1.0, 1.5, 2.0, 2.61],
            partial_gain: 0.15,
            pulse_rate_hz: 0.1,
            pulse_rate_spread: 0.3,
            pulse_depth: 0.5,
            detune_cents: 5.0,
            pan_spread: 0.5,
            noise_secs: 2.0,
            noise_cutoff_hz: 200.0,
            noise_lfo_rate_hz: 0.05,
            noise_lfo_depth_hz: 80.0,
        }
    }
}

impl DroneParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.level) {
            return Err(ResonanceError::invalid_parameter("level", self.level, "0 to 1"));
        }
        if !(0.0..=30.0).contains(&self.fade_in_secs) || !(0.0..=30.0).contains(&self.fade_out_secs)
        {
            return Err(ResonanceError::invalid_parameter(
                "fade_secs",
                format!("{}/{}", self.fade_in_secs, self.fade_out_secs),
                "0 to 30 seconds",
            ));
        }
        if self.partials.is_empty() || self.partials.iter().any(|m| !m.is_finite() || *m <= 0.0) {
            return Err(ResonanceError::invalid_parameter(
                "partials",
                format!("{:?}", self.partials),
                "one or more positive multiples",
            ));
        }
        if !(0.0..=1.0).contains(&self.pulse_depth) {
            return Err(ResonanceError::invalid_parameter(
                "pulse_depth",
                self.pulse_depth,
                "0 to 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.pan_spread) {
            return Err(ResonanceError::invalid_parameter("pan_spread", self.pan_spread, "0 to 1"));
        }
        if !(0.0..=100.0).contains(&self.detune_cents) {
            return Err(ResonanceError::invalid_parameter(
                "detune_cents",
                self.detune_cents,
                "0 to 100 cents",
            ));
        }
        if self.pulse_rate_hz <= 0.0 || self.pulse_rate_spread < 0.0 {
            return Err(ResonanceError::invalid_parameter(
                "pulse_rate_hz",
                self.pulse_rate_hz,
                "a positive rate with a non-negative spread",
            ));
        }
        if self.noise_secs <= 0.0 || self.noise_cutoff_hz <= 0.0 {
            return Err(ResonanceError::invalid_parameter(
                "noise",
                format!("{} s at {} Hz", self.noise_secs, self.noise_cutoff_hz),
                "a positive length and cutoff",
            ));
        }
        Ok(())
    }

    /// Pulse LFO rate for partial `index`; distinct for every partial
    pub fn pulse_rate_for(&self, index: usize) -> f64 {
        self.pulse_rate_hz * (1.0 + self.pulse_rate_spread * index as f64)
    }
}

// ============================================================================
// Drone Graph
// ============================================================================

/// One tuned partial with its amplitude pulse
#[derive(Debug)]
struct Partial {
    osc: Oscillator,
    pulse: Oscillator,
    pulse_depth: GainNode,
    gain: GainNode,
    panner: StereoPanner,
}

impl Partial {
    fn nodes(&self) -> [&dyn Node; 5] {
        [
            &self.osc,
            &self.pulse,
            &self.pulse_depth,
            &self.gain,
            &self.panner,
        ]
    }

    fn teardown(&mut self) {
        self.osc.teardown();
        self.pulse.teardown();
        self.pulse_depth.teardown();
        self.gain.teardown();
        self.panner.teardown();
    }
}

/// Ambient drone layer
#[derive(Debug)]
pub struct ZenDrone {
    noise: BufferSource,
    noise_filter: BiquadFilter,
    noise_lfo: Oscillator,
    noise_lfo_depth: GainNode,
    partials: Vec<Partial>,
    master: GainNode,
    target_hz: f64,
    fade_out_secs: f64,
    /// Clock time after which a released drone is silent
    release_deadline: Option<f64>,
    /// End of the most recently rendered block
    clock: f64,
    tone: Vec<f32>,
    pulse: Vec<f32>,
    drift: Vec<f32>,
    /// Stereo mix bus, cleared at the start of every block
    left: Vec<f32>,
    right: Vec<f32>,
}

impl ZenDrone {
    /// Build and start a drone tuned to `target_hz`, sounding from `when`
    ///
    /// `seed` drives the noise, detune and pan choices so a drone can be
    /// reproduced exactly.
    pub fn build(
        target_hz: f64,
        when: f64,
        params: &DroneParams,
        sample_rate: u32,
        seed: u64,
    ) -> Result<Self> {
        params.validate()?;
        if !target_hz.is_finite() || target_hz <= 0.0 {
            return Err(ResonanceError::invalid_parameter(
                "target_hz",
                target_hz,
                "a positive frequency",
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);

        let mut master = GainNode::new(0.0);
        master.gain.set_value_at_time(0.0, when);
        master
            .gain
            .linear_ramp_to_value_at_time(params.level, when + params.fade_in_secs);
        master.start(when)?;

        let noise_buffer = Arc::new(noise_buffer(params.noise_secs, sample_rate, &mut rng));
        let mut noise = BufferSource::new(noise_buffer).looping();
        let mut noise_filter = BiquadFilter::low_pass(params.noise_cutoff_hz);
        let mut noise_lfo = Oscillator::sine(params.noise_lfo_rate_hz);
        let mut noise_lfo_depth = GainNode::new(params.noise_lfo_depth_hz);
        noise_filter.start(when)?;
        noise_lfo_depth.start(when)?;
        noise_lfo.start(when)?;
        noise.start_at(when, 0.0)?;

        let mut partials = Vec::with_capacity(params.partials.len());
        for (i, multiple) in params.partials.iter().enumerate() {
            let base = params.partial_gain / (i + 1) as f64;
            let half_depth = params.pulse_depth / 2.0;
            let detune = rng.gen_range(-1.0..=1.0) * params.detune_cents;
            let pan = rng.gen_range(-1.0..=1.0) * params.pan_spread;

            let mut partial = Partial {
                osc: Oscillator::sine(target_hz * multiple).with_detune(detune),
                pulse: Oscillator::sine(params.pulse_rate_for(i)),
                // amplitude = base * (1 - d/2) + base * d/2 * pulse
                pulse_depth: GainNode::new(base * half_depth),
                gain: GainNode::new(base * (1.0 - half_depth)),
                panner: StereoPanner::new(pan),
            };
            partial.panner.start(when)?;
            partial.gain.start(when)?;
            partial.pulse_depth.start(when)?;
            partial.pulse.start(when)?;
            partial.osc.start(when)?;
            partials.push(partial);
        }

        debug!(
            target_hz,
            when,
            partials = partials.len(),
            seed,
            "zen drone built"
        );

        Ok(Self {
            noise,
            noise_filter,
            noise_lfo,
            noise_lfo_depth,
            partials,
            master,
            target_hz,
            fade_out_secs: params.fade_out_secs,
            release_deadline: None,
            clock: when,
            tone: Vec::new(),
            pulse: Vec::new(),
            drift: Vec::new(),
            left: Vec::new(),
            right: Vec::new(),
        })
    }

    pub fn target_hz(&self) -> f64 {
        self.target_hz
    }

    /// Frequencies of the partial oscillators, detune applied
    pub fn partial_frequencies(&self) -> Vec<f64> {
        self.partials
            .iter()
            .map(|p| p.osc.frequency_at(self.clock))
            .collect()
    }

    /// Pulse LFO rates of the partials in Hz
    pub fn pulse_rates(&self) -> Vec<f64> {
        self.partials
            .iter()
            .map(|p| p.pulse.frequency_at(self.clock))
            .collect()
    }

    /// Pan positions of the partials
    pub fn pans(&self) -> Vec<f64> {
        self.partials.iter().map(|p| p.panner.pan()).collect()
    }

    /// Master gain at audio-clock `time`
    pub fn master_gain_at(&self, time: f64) -> f64 {
        self.master.gain.value_at(time)
    }

    pub fn is_releasing(&self) -> bool {
        self.release_deadline.is_some()
    }

    fn nodes(&self) -> impl Iterator<Item = &dyn Node> {
        let fixed: [&dyn Node; 5] = [
            &self.noise,
            &self.noise_filter,
            &self.noise_lfo,
            &self.noise_lfo_depth,
            &self.master,
        ];
        fixed
            .into_iter()
            .chain(self.partials.iter().flat_map(|p| p.nodes()))
    }
}

impl SignalGraph for ZenDrone {
    fn label(&self) -> &str {
        "zen_drone"
    }

    fn render(&mut self, start_time: f64, out: &mut AudioBuffer) {
        let frames = out.num_samples();
        let sample_rate = out.sample_rate;
        self.tone.resize(frames, 0.0);
        self.pulse.resize(frames, 0.0);
        self.drift.resize(frames, 0.0);

        self.left.resize(frames, 0.0);
        self.right.resize(frames, 0.0);
        self.left.fill(0.0);
        self.right.fill(0.0);

        // Wind layer, centred
        self.noise.render(start_time, sample_rate, &mut self.tone);
        self.noise_lfo.render(start_time, sample_rate, &mut self.drift);
        self.noise_lfo_depth
            .process(start_time, sample_rate, &mut self.drift);
        let drift = self.drift.first().copied().unwrap_or(0.0) as f64;
        self.noise_filter
            .process(start_time, sample_rate, drift, &mut self.tone);
        for ((l, r), &x) in self.left.iter_mut().zip(self.right.iter_mut()).zip(&self.tone) {
            *l += x;
            *r += x;
        }

        // Tuned partials
        for partial in &mut self.partials {
            partial.osc.render(start_time, sample_rate, &mut self.tone);
            partial.pulse.render(start_time, sample_rate, &mut self.pulse);
            partial
                .pulse_depth
                .process(start_time, sample_rate, &mut self.pulse);
            partial
                .gain
                .process_modulated(start_time, sample_rate, &self.pulse, &mut self.tone);
            partial
                .panner
                .mix_into(&self.tone, &mut self.left, &mut self.right);
        }

        self.master.process(start_time, sample_rate, &mut self.left);
        self.master.process(start_time, sample_rate, &mut self.right);

        for (dst, src) in out.samples.iter_mut().zip([&self.left, &self.right]) {
            for (d, &s) in dst.iter_mut().zip(src.iter()) {
                *d += s;
            }
        }

        self.clock = start_time + frames as f64 / sample_rate as f64;
    }

    /// Fade the master out from its current level; nodes keep running until
    /// the fade completes
    fn release(&mut self, now: f64) {
        if self.release_deadline.is_some() {
            return;
        }
        self.master.gain.cancel_and_hold_at_time(now);
        self.master
            .gain
            .linear_ramp_to_value_at_time(0.0, now + self.fade_out_secs);
        self.release_deadline = Some(now + self.fade_out_secs);
        debug!(now, fade_out = self.fade_out_secs, "zen drone releasing");
    }

    fn teardown(&mut self) {
        self.noise.teardown();
        self.noise_filter.teardown();
        self.noise_lfo.teardown();
        self.noise_lfo_depth.teardown();
        for partial in &mut self.partials {
            partial.teardown();
        }
        self.master.teardown();
        trace!(target_hz = self.target_hz, "zen drone torn down");
    }

    fn active_nodes(&self) -> usize {
        self.nodes().filter(|n| n.is_active()).count()
    }

    fn is_finished(&self) -> bool {
        match self.release_deadline {
            Some(deadline) => self.clock >= deadline,
            None => self.active_nodes() == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::graph::render_graph;
    use approx::assert_abs_diff_eq;

    fn drone(seed: u64) -> ZenDrone {
        ZenDrone::build(432.0, 0.0, &DroneParams::default(), 48000, seed).unwrap()
    }

    #[test]
    fn test_default_params_validate() {
        assert!(DroneParams::default().validate().is_ok());
        let params = DroneParams {
            partials: vec![],
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_partials_tuned_to_target() {
        let drone = drone(1);
        let freqs = drone.partial_frequencies();
        assert_eq!(freqs.len(), 4);
        for (freq, multiple) in freqs.iter().zip([1.0, 1.5, 2.0, 2.61]) {
            let nominal = 432.0 * multiple;
            // Within +/- 5 cents
            let cents = 1200.0 * (freq / nominal).log2();
            assert!(cents.abs() <= 5.0 + 1e-9, "{} cents", cents);
        }
    }

    #[test]
    fn test_pulse_rates_are_distinct() {
        let rates = drone(1).pulse_rates();
        for (i, a) in rates.iter().enumerate() {
            for b in &rates[i + 1..] {
                assert!((a - b).abs() > 1e-6);
            }
        }
    }

    #[test]
    fn test_pans_within_spread() {
        assert!(drone(9).pans().iter().all(|p| p.abs() <= 0.5));
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = render_graph(&mut drone(42), 48000, 0.5);
        let b = render_graph(&mut drone(42), 48000, 0.5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_mix_bus_cleared_between_blocks() {
        // Fixed noise cutoff so block boundaries do not change the filter
        let params = DroneParams {
            noise_lfo_depth_hz: 0.0,
            ..Default::default()
        };
        let mut long = ZenDrone::build(432.0, 0.0, &params, 48000, 7).unwrap();
        let mut short = ZenDrone::build(432.0, 0.0, &params, 48000, 7).unwrap();
        let quantum = 128.0 / 48000.0;
        // Past the fade-in
        let t = 3.0;

        let mut wide = AudioBuffer::new(2, 256, 48000);
        long.render(t, &mut wide);
        let mut a = AudioBuffer::new(2, 128, 48000);
        long.render(t + 2.0 * quantum, &mut a);

        let mut b = AudioBuffer::new(2, 128, 48000);
        for i in 0..3 {
            b.clear();
            short.render(t + i as f64 * quantum, &mut b);
        }

        assert!(a.peak() > 0.001);
        for ch in 0..2 {
            for (x, y) in a.channel(ch).iter().zip(b.channel(ch)) {
                assert_abs_diff_eq!(*x, *y, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_fade_in() {
        let drone = drone(1);
        assert_eq!(drone.master_gain_at(0.0), 0.0);
        assert_abs_diff_eq!(drone.master_gain_at(1.0), 0.02, epsilon = 1e-12);
        assert_abs_diff_eq!(drone.master_gain_at(2.0), 0.04, epsilon = 1e-12);
        assert_abs_diff_eq!(drone.master_gain_at(10.0), 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_output_is_quiet_but_present() {
        let out = render_graph(&mut drone(3), 48000, 3.0);
        let tail = &out.channel(0)[2 * 48000..];
        let peak = tail.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.001);
        assert!(peak < 0.5);
    }

    #[test]
    fn test_release_fades_then_finishes() {
        let mut drone = drone(1);
        let mut block = AudioBuffer::new(2, 128, 48000);
        let quantum = 128.0 / 48000.0;
        let mut t = 0.0;
        while t < 3.0 {
            block.clear();
            drone.render(t, &mut block);
            t += quantum;
        }

        drone.release(t);
        assert!(drone.is_releasing());
        assert!(!drone.is_finished());
        assert_abs_diff_eq!(drone.master_gain_at(t), 0.04, epsilon = 1e-12);
        assert_abs_diff_eq!(drone.master_gain_at(t + 1.0), 0.02, epsilon = 1e-12);

        // Second release does not restart the fade
        drone.release(t + 1.0);
        assert_abs_diff_eq!(drone.master_gain_at(t + 2.0), 0.0, epsilon = 1e-12);

        while t < 5.1 {
            block.clear();
            drone.render(t, &mut block);
            t += quantum;
        }
        assert!(drone.is_finished());
        assert!(block.peak() < 1e-6);
    }

    #[test]
    fn test_teardown_silences_everything() {
        let mut drone = drone(1);
        assert_eq!(drone.active_nodes(), 25);
        drone.teardown();
        drone.teardown();
        assert_eq!(drone.active_nodes(), 0);
        assert!(drone.is_finished());

        let mut block = AudioBuffer::new(2, 128, 48000);
        drone.render(3.0, &mut block);
        assert_eq!(block.peak(), 0.0);
    }
}
