//! Gain and stereo panning nodes

use std::f64::consts::FRAC_PI_2;

use super::node::{Lifecycle, Node};
use super::param::AudioParam;

/// Multiplies a mono signal by an automatable gain
#[derive(Debug, Clone)]
pub struct GainNode {
    pub gain: AudioParam,
    lifecycle: Lifecycle,
}

impl GainNode {
    pub fn new(gain: f64) -> Self {
        Self {
            gain: AudioParam::new(gain),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Apply the gain to one block in place; inactive nodes output silence
    pub fn process(&mut self, start_time: f64, sample_rate: u32, block: &mut [f32]) {
        if !self.lifecycle.is_active() {
            block.iter_mut().for_each(|s| *s = 0.0);
            return;
        }

        let sr = sample_rate as f64;
        for (i, sample) in block.iter_mut().enumerate() {
            let t = start_time + i as f64 / sr;
            *sample *= self.gain.value_at(t) as f32;
        }
    }

    /// Like [`process`](Self::process), with an audio-rate signal summed
    /// into the gain parameter
    pub fn process_modulated(
        &mut self,
        start_time: f64,
        sample_rate: u32,
        modulation: &[f32],
        block: &mut [f32],
    ) {
        if !self.lifecycle.is_active() {
            block.iter_mut().for_each(|s| *s = 0.0);
            return;
        }

        let sr = sample_rate as f64;
        for (i, (sample, &m)) in block.iter_mut().zip(modulation).enumerate() {
            let t = start_time + i as f64 / sr;
            *sample *= self.gain.value_at(t) as f32 + m;
        }
    }
}

impl Node for GainNode {
    fn kind(&self) -> &'static str {
        "gain"
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

/// Places a mono signal in the stereo field with the equal-power law
///
/// Pan ranges from -1.0 (full left) to 1.0 (full right); centre feeds both
/// sides at -3 dB.
#[derive(Debug, Clone)]
pub struct StereoPanner {
    pan: f64,
    left_gain: f32,
    right_gain: f32,
    lifecycle: Lifecycle,
}

impl StereoPanner {
    pub fn new(pan: f64) -> Self {
        let pan = pan.clamp(-1.0, 1.0);
        let angle = (pan + 1.0) / 2.0 * FRAC_PI_2;
        Self {
            pan,
            left_gain: angle.cos() as f32,
            right_gain: angle.sin() as f32,
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn pan(&self) -> f64 {
        self.pan
    }

    /// Per-side gains as (left, right)
    pub fn gains(&self) -> (f32, f32) {
        (self.left_gain, self.right_gain)
    }

    /// Mix `input` into the left and right outputs
    pub fn mix_into(&self, input: &[f32], left: &mut [f32], right: &mut [f32]) {
        if !self.lifecycle.is_active() {
            return;
        }
        for ((&x, l), r) in input.iter().zip(left.iter_mut()).zip(right.iter_mut()) {
            *l += x * self.left_gain;
            *r += x * self.right_gain;
        }
    }
}

impl Node for StereoPanner {
    fn kind(&self) -> &'static str {
        "stereo_panner"
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_gain_follows_automation() {
        let mut node = GainNode::new(0.0);
        node.gain.set_value_at_time(0.0, 0.0);
        node.gain.linear_ramp_to_value_at_time(1.0, 1.0);
        node.start(0.0).unwrap();

        let mut block = [1.0_f32; 5];
        node.process(0.0, 4, &mut block);
        assert_eq!(block, [0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_modulated_gain() {
        let mut node = GainNode::new(0.5);
        node.start(0.0).unwrap();
        let mut block = [1.0_f32; 3];
        node.process_modulated(0.0, 48000, &[0.25, 0.0, -0.25], &mut block);
        assert_eq!(block, [0.75, 0.5, 0.25]);
    }

    #[test]
    fn test_disconnected_gain_is_silent() {
        let mut node = GainNode::new(1.0);
        node.start(0.0).unwrap();
        node.disconnect();
        let mut block = [1.0_f32; 4];
        node.process(0.0, 48000, &mut block);
        assert!(block.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_centre_pan_is_equal_power() {
        let panner = StereoPanner::new(0.0);
        let (l, r) = panner.gains();
        assert_abs_diff_eq!(l, r);
        assert_abs_diff_eq!(l * l + r * r, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_hard_pan() {
        let mut panner = StereoPanner::new(-1.0);
        panner.start(0.0).unwrap();
        let mut left = [0.0_f32; 2];
        let mut right = [0.0_f32; 2];
        panner.mix_into(&[1.0, 1.0], &mut left, &mut right);
        assert_abs_diff_eq!(left[0], 1.0);
        assert_abs_diff_eq!(right[0], 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_pan_is_clamped() {
        assert_eq!(StereoPanner::new(3.0).pan(), 1.0);
    }
}
