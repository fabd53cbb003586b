//! Interface cue sounds
//!
//! Short synthesized sounds for opening and closing the oracle panel and
//! for moving to a new ritual phase. Each cue is a small graph of
//! oscillators with scheduled envelopes, rendered offline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::biquad::BiquadFilter;
use super::graph::{render_graph, SignalGraph};
use super::mix::GainNode;
use super::node::Node;
use super::oscillator::{Oscillator, Waveform};
use crate::engine::buffer::AudioBuffer;
use crate::error::{ResonanceError, Result};

/// Master level of every cue, reached 50 ms after the start
const CUE_LEVEL: f64 = 0.1;

/// Interface cue kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiCue {
    /// Rising arpeggio of chirps
    Open,
    /// Falling, darkening sweep
    Close,
    /// Inharmonic bell
    PhaseShift,
}

impl UiCue {
    pub const ALL: [UiCue; 3] = [UiCue::Open, UiCue::Close, UiCue::PhaseShift];

    /// Length of the rendered cue in seconds
    pub fn duration_secs(self) -> f64 {
        match self {
            UiCue::Open => 0.65,
            UiCue::Close => 0.5,
            UiCue::PhaseShift => 3.0,
        }
    }
}

impl fmt::Display for UiCue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiCue::Open => write!(f, "open"),
            UiCue::Close => write!(f, "close"),
            UiCue::PhaseShift => write!(f, "phase"),
        }
    }
}

impl FromStr for UiCue {
    type Err = ResonanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(UiCue::Open),
            "close" => Ok(UiCue::Close),
            "phase" | "phase_shift" | "phase-shift" => Ok(UiCue::PhaseShift),
            other => Err(ResonanceError::invalid_parameter(
                "cue",
                other,
                "open, close or phase",
            )),
        }
    }
}

/// One oscillator with its envelope and optional tone filter
#[derive(Debug)]
struct CueVoice {
    osc: Oscillator,
    filter: Option<BiquadFilter>,
    envelope: GainNode,
}

impl CueVoice {
    fn new(osc: Oscillator, envelope: GainNode) -> Self {
        Self {
            osc,
            filter: None,
            envelope,
        }
    }

    fn start(&mut self, when: f64, stop: f64) -> Result<()> {
        self.envelope.start(when)?;
        if let Some(filter) = self.filter.as_mut() {
            filter.start(when)?;
        }
        self.osc.start(when)?;
        self.osc.lifecycle_mut().stop_at(stop);
        Ok(())
    }

    fn teardown(&mut self) {
        self.osc.teardown();
        if let Some(filter) = self.filter.as_mut() {
            filter.teardown();
        }
        self.envelope.teardown();
    }

    fn active_nodes(&self) -> usize {
        usize::from(self.osc.is_active())
            + usize::from(self.envelope.is_active())
            + self.filter.as_ref().map_or(0, |f| usize::from(f.is_active()))
    }
}

/// Graph playing one cue
#[derive(Debug)]
pub struct CueGraph {
    cue: UiCue,
    voices: Vec<CueVoice>,
    master: GainNode,
    end_time: f64,
    clock: f64,
    scratch: Vec<f32>,
}

impl CueGraph {
    /// Build and schedule `cue` to begin at audio-clock `now`
    pub fn build(cue: UiCue, now: f64) -> Result<Self> {
        let mut master = GainNode::new(0.0);
        master.gain.set_value_at_time(0.0, now);
        master.gain.linear_ramp_to_value_at_time(CUE_LEVEL, now + 0.05);
        master.start(now)?;

        let mut voices = Vec::new();
        match cue {
            UiCue::Open => {
                for (i, freq) in [220.0, 277.18, 329.63, 440.0].into_iter().enumerate() {
                    let at = now + i as f64 * 0.05;
                    let mut osc = Oscillator::sine(freq);
                    osc.frequency.set_value_at_time(freq, at);
                    osc.frequency.exponential_ramp_to_value_at_time(freq * 1.5, at + 0.3);

                    let mut envelope = GainNode::new(0.0);
                    envelope.gain.set_value_at_time(0.0, at);
                    envelope.gain.linear_ramp_to_value_at_time(0.3, at + 0.05);
                    envelope.gain.exponential_ramp_to_value_at_time(0.001, at + 0.4);

                    let mut voice = CueVoice::new(osc, envelope);
                    voice.start(at, at + 0.5)?;
                    voices.push(voice);
                }
            }
            UiCue::Close => {
                let mut osc = Oscillator::new(Waveform::Triangle, 330.0);
                osc.frequency.set_value_at_time(330.0, now);
                osc.frequency.exponential_ramp_to_value_at_time(82.41, now + 0.5);

                let mut filter = BiquadFilter::low_pass(1500.0);
                filter.frequency.set_value_at_time(1500.0, now);
                filter.frequency.exponential_ramp_to_value_at_time(50.0, now + 0.5);

                let mut envelope = GainNode::new(0.4);
                envelope.gain.set_value_at_time(0.4, now);
                envelope.gain.exponential_ramp_to_value_at_time(0.001, now + 0.5);

                let mut voice = CueVoice::new(osc, envelope);
                voice.filter = Some(filter);
                voice.start(now, now + 0.5)?;
                voices.push(voice);
            }
            UiCue::PhaseShift => {
                let fundamental = 174.61;
                for (i, harmonic) in [1.0, 2.76, 5.4, 8.93, 11.34].into_iter().enumerate() {
                    let osc = Oscillator::sine(fundamental * harmonic);

                    let mut envelope = GainNode::new(0.0);
                    envelope.gain.set_value_at_time(0.0, now);
                    envelope
                        .gain
                        .linear_ramp_to_value_at_time(0.08 / (i + 1) as f64, now + 0.2);
                    envelope.gain.exponential_ramp_to_value_at_time(0.001, now + 3.0);

                    let mut voice = CueVoice::new(osc, envelope);
                    voice.start(now, now + 3.0)?;
                    voices.push(voice);
                }
            }
        }

        debug!(%cue, voices = voices.len(), "cue scheduled");

        Ok(Self {
            cue,
            voices,
            master,
            end_time: now + cue.duration_secs(),
            clock: now,
            scratch: Vec::new(),
        })
    }

    pub fn cue(&self) -> UiCue {
        self.cue
    }
}

impl SignalGraph for CueGraph {
    fn label(&self) -> &str {
        "ui_cue"
    }

    fn render(&mut self, start_time: f64, out: &mut AudioBuffer) {
        let frames = out.num_samples();
        let sample_rate = out.sample_rate;
        let mut mix = vec![0.0_f32; frames];
        self.scratch.resize(frames, 0.0);

        for voice in &mut self.voices {
            voice.osc.render(start_time, sample_rate, &mut self.scratch);
            if let Some(filter) = voice.filter.as_mut() {
                filter.process(start_time, sample_rate, 0.0, &mut self.scratch);
            }
            voice
                .envelope
                .process(start_time, sample_rate, &mut self.scratch);
            for (m, &s) in mix.iter_mut().zip(&self.scratch) {
                *m += s;
            }
        }

        self.master.process(start_time, sample_rate, &mut mix);
        for channel in out.samples.iter_mut() {
            for (dst, &src) in channel.iter_mut().zip(&mix) {
                *dst += src;
            }
        }

        self.clock = start_time + frames as f64 / sample_rate as f64;
    }

    fn release(&mut self, _now: f64) {
        // Cues are short; let them ring out
    }

    fn teardown(&mut self) {
        for voice in &mut self.voices {
            voice.teardown();
        }
        self.master.teardown();
    }

    fn active_nodes(&self) -> usize {
        self.voices.iter().map(CueVoice::active_nodes).sum::<usize>()
            + usize::from(self.master.is_active())
    }

    fn is_finished(&self) -> bool {
        self.clock >= self.end_time || self.active_nodes() == 0
    }
}

/// Render a cue to a stereo buffer at `sample_rate`
pub fn render_cue(cue: UiCue, sample_rate: u32) -> Result<AudioBuffer> {
    if sample_rate == 0 {
        return Err(ResonanceError::invalid_parameter(
            "sample_rate",
            sample_rate,
            "a positive sample rate",
        ));
    }
    let mut graph = CueGraph::build(cue, 0.0)?;
    Ok(render_graph(&mut graph, sample_rate, cue.duration_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cue() {
        assert_eq!("open".parse::<UiCue>().unwrap(), UiCue::Open);
        assert_eq!("Phase".parse::<UiCue>().unwrap(), UiCue::PhaseShift);
        assert!("fanfare".parse::<UiCue>().is_err());
        for cue in UiCue::ALL {
            assert_eq!(cue.to_string().parse::<UiCue>().unwrap(), cue);
        }
    }

    #[test]
    fn test_every_cue_renders_sound() {
        for cue in UiCue::ALL {
            let out = render_cue(cue, 48000).unwrap();
            let expected = (cue.duration_secs() * 48000.0).round() as usize;
            assert_eq!(out.num_samples(), expected, "{}", cue);
            assert!(out.peak() > 0.001, "{} is silent", cue);
            assert!(out.peak() <= 0.2, "{} is too loud", cue);
            assert!(out.is_finite());
        }
    }

    #[test]
    fn test_cue_decays_to_near_silence() {
        let out = render_cue(UiCue::Close, 48000).unwrap();
        let tail = &out.channel(0)[out.num_samples() - 256..];
        assert!(tail.iter().all(|s| s.abs() < 0.005));
    }

    #[test]
    fn test_cue_finishes_after_its_duration() {
        let mut graph = CueGraph::build(UiCue::Open, 0.0).unwrap();
        let mut block = AudioBuffer::new(2, 128, 48000);
        let mut t = 0.0;
        while t < 0.7 {
            block.clear();
            graph.render(t, &mut block);
            t += 128.0 / 48000.0;
        }
        assert!(graph.is_finished());
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(render_cue(UiCue::Open, 0).is_err());
    }
}
