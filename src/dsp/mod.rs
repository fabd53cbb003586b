//! DSP Node Library
//!
//! Block-based signal processing nodes and the graphs built from them.
//! Every node follows the same Created -> Running -> Stopped lifecycle and
//! renders mono blocks against the audio clock; graphs mix their nodes into
//! stereo output.

pub mod biquad;
pub mod chain;
pub mod compressor;
pub mod cue;
pub mod drone;
pub mod graph;
pub mod mix;
pub mod node;
pub mod oscillator;
pub mod param;
pub mod source;

pub use biquad::{BiquadCoeffs, BiquadFilter, FilterType};
pub use chain::{clamp_start_offset, ResonanceChain, ResonanceParams, START_EPSILON_SECS};
pub use compressor::{Compressor, CompressorParams};
pub use cue::{render_cue, CueGraph, UiCue};
pub use drone::{DroneParams, ZenDrone};
pub use graph::{render_graph, GraphId, SignalGraph, RENDER_QUANTUM};
pub use mix::{GainNode, StereoPanner};
pub use node::{Lifecycle, Node, NodeState};
pub use oscillator::{Oscillator, Waveform};
pub use param::{AudioParam, ParamEvent};
pub use source::{noise_buffer, BufferSource};
