//! Automatable node parameters
//!
//! A parameter has a static value plus a time-ordered list of scheduled
//! events (set, linear ramp, exponential ramp). Ramps start from the value
//! and time of the preceding event, matching how browser audio graphs
//! automate gain and frequency.

use serde::{Deserialize, Serialize};

/// One scheduled change on an [`AudioParam`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamEvent {
    /// Jump to `value` at `time`
    SetValue { time: f64, value: f64 },
    /// Reach `value` at `time`, linearly from the previous event
    LinearRamp { time: f64, value: f64 },
    /// Reach `value` at `time`, exponentially from the previous event
    ExponentialRamp { time: f64, value: f64 },
}

impl ParamEvent {
    pub fn time(&self) -> f64 {
        match *self {
            ParamEvent::SetValue { time, .. }
            | ParamEvent::LinearRamp { time, .. }
            | ParamEvent::ExponentialRamp { time, .. } => time,
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            ParamEvent::SetValue { value, .. }
            | ParamEvent::LinearRamp { value, .. }
            | ParamEvent::ExponentialRamp { value, .. } => value,
        }
    }
}

/// A parameter value that can change over audio-clock time
#[derive(Debug, Clone, PartialEq)]
pub struct AudioParam {
    value: f64,
    min: f64,
    max: f64,
    events: Vec<ParamEvent>,
}

impl AudioParam {
    /// Create an unbounded parameter
    pub fn new(value: f64) -> Self {
        Self::with_range(value, f64::MIN, f64::MAX)
    }

    /// Create a parameter whose computed value is clamped to `[min, max]`
    pub fn with_range(value: f64, min: f64, max: f64) -> Self {
        Self {
            value,
            min,
            max,
            events: Vec::new(),
        }
    }

    /// Static value used before the first event
    pub fn base_value(&self) -> f64 {
        self.value
    }

    /// Replace the static value and drop every scheduled event
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
        self.events.clear();
    }

    pub fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(ParamEvent::SetValue { time, value });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(ParamEvent::LinearRamp { time, value });
    }

    pub fn exponential_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(ParamEvent::ExponentialRamp { time, value });
    }

    /// Remove every event scheduled at or after `time`
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Freeze the parameter at its value at `time` and drop later events
    pub fn cancel_and_hold_at_time(&mut self, time: f64) {
        let held = self.raw_value_at(time);
        self.events.retain(|e| e.time() < time);
        self.events.push(ParamEvent::SetValue { time, value: held });
    }

    pub fn events(&self) -> &[ParamEvent] {
        &self.events
    }

    /// Computed value at `time`, clamped to the parameter's range
    pub fn value_at(&self, time: f64) -> f64 {
        self.raw_value_at(time).clamp(self.min, self.max)
    }

    fn insert(&mut self, event: ParamEvent) {
        let at = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(at, event);
    }

    fn raw_value_at(&self, time: f64) -> f64 {
        let mut current = self.value;
        let mut current_time = 0.0_f64;

        for event in &self.events {
            match *event {
                ParamEvent::SetValue { time: at, value } => {
                    if at > time {
                        break;
                    }
                    current = value;
                    current_time = at;
                }
                ParamEvent::LinearRamp { time: end, value } => {
                    if end <= time {
                        current = value;
                        current_time = end;
                        continue;
                    }
                    if time <= current_time {
                        break;
                    }
                    let frac = (time - current_time) / (end - current_time);
                    return current + (value - current) * frac;
                }
                ParamEvent::ExponentialRamp { time: end, value } => {
                    if end <= time {
                        current = value;
                        current_time = end;
                        continue;
                    }
                    if time <= current_time {
                        break;
                    }
                    let frac = (time - current_time) / (end - current_time);
                    // Exponential curves need a same-signed, non-zero range
                    if current == 0.0 || value == 0.0 || current.signum() != value.signum() {
                        return current;
                    }
                    return current * (value / current).powf(frac);
                }
            }
        }

        current
    }
}
