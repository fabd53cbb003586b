//! Biquad filter node
//!
//! Peaking and low-pass sections built from the Audio EQ Cookbook. The centre
//! frequency is an automatable parameter; an extra per-block offset lets an
//! LFO sweep it. Coefficients are recomputed once per render block.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::node::{Lifecycle, Node};
use super::param::AudioParam;

/// Filter response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Bell curve boost/cut around the centre frequency
    #[default]
    Peak,
    /// Remove above the corner frequency
    LowPass,
}

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (a0 + a1*z^-1 + a2*z^-2)
/// Normalized: all coefficients divided by a0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    /// Calculate biquad coefficients using Audio EQ Cookbook formulas
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    pub fn calculate(
        filter_type: FilterType,
        sample_rate: f64,
        frequency: f64,
        gain_db: f64,
        q: f64,
    ) -> Self {
        // Keep the corner inside the audible band and below Nyquist
        let freq = frequency.clamp(10.0, sample_rate / 2.0 - 1.0);
        let q = q.clamp(0.1, 30.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::Peak => {
                let a = 10.0_f64.powf(gain_db / 40.0);
                (
                    1.0 + alpha * a,
                    -2.0 * cos_w0,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_w0,
                    1.0 - alpha / a,
                )
            }
            FilterType::LowPass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response at `frequency`, used by tests and `inspect`
    pub fn magnitude_at(&self, frequency: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());

        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);

        (num_re.hypot(num_im)) / (den_re.hypot(den_im))
    }
}

/// Biquad filter state (Direct Form I)
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64, // x[n-1]
    x2: f64, // x[n-2]
    y1: f64, // y[n-1]
    y2: f64, // y[n-2]
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

/// Filter node processing a mono signal in place
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    filter_type: FilterType,
    /// Centre or corner frequency in Hz
    pub frequency: AudioParam,
    q: f64,
    gain_db: f64,
    coeffs: BiquadCoeffs,
    state: BiquadState,
    lifecycle: Lifecycle,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, frequency: f64, q: f64, gain_db: f64) -> Self {
        Self {
            filter_type,
            frequency: AudioParam::new(frequency),
            q,
            gain_db,
            coeffs: BiquadCoeffs::default(),
            state: BiquadState::default(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Peaking section: boosts `gain_db` around `frequency`
    pub fn peaking(frequency: f64, q: f64, gain_db: f64) -> Self {
        Self::new(FilterType::Peak, frequency, q, gain_db)
    }

    /// Butterworth-style low-pass
    pub fn low_pass(frequency: f64) -> Self {
        Self::new(FilterType::LowPass, frequency, std::f64::consts::FRAC_1_SQRT_2, 0.0)
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    pub fn coefficients(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    /// Filter one block in place
    ///
    /// `frequency_offset` is added to the automated frequency for this block
    /// (LFO modulation). Inactive filters output silence.
    pub fn process(
        &mut self,
        start_time: f64,
        sample_rate: u32,
        frequency_offset: f64,
        block: &mut [f32],
    ) {
        if !self.lifecycle.is_active() {
            block.iter_mut().for_each(|s| *s = 0.0);
            return;
        }

        let frequency = self.frequency.value_at(start_time) + frequency_offset;
        self.coeffs = BiquadCoeffs::calculate(
            self.filter_type,
            sample_rate as f64,
            frequency,
            self.gain_db,
            self.q,
        );

        for sample in block.iter_mut() {
            *sample = self.state.process(*sample as f64, &self.coeffs) as f32;
        }
    }
}

impl Node for BiquadFilter {
    fn kind(&self) -> &'static str {
        match self.filter_type {
            FilterType::Peak => "peaking_filter",
            FilterType::LowPass => "lowpass_filter",
        }
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}
