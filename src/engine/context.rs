//! Offline audio rendering context
//!
//! The context owns the audio clock, the attached signal graphs and the
//! output sink. It renders in fixed quanta: every attached graph adds its
//! block into a shared stereo buffer, the block goes to the sink, and the
//! clock advances. The clock only moves while the context is running.
//!
//! Graphs that report themselves finished are torn down and detached at the
//! end of the quantum in which they finish.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, trace};

use super::buffer::{AudioBuffer, DEFAULT_CONTEXT_SAMPLE_RATE};
use super::sink::AudioSink;
use crate::dsp::graph::{GraphId, SignalGraph, RENDER_QUANTUM};
use crate::error::{ResonanceError, Result};

/// Output channel count of every context
pub const OUTPUT_CHANNELS: usize = 2;

/// Lifecycle of a rendering context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextState {
    /// Created or paused; the clock is frozen
    #[default]
    Suspended,
    /// Rendering; the sink is open
    Running,
    /// Shut down for good
    Closed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::Suspended => write!(f, "suspended"),
            ContextState::Running => write!(f, "running"),
            ContextState::Closed => write!(f, "closed"),
        }
    }
}

/// Audio clock plus the graphs rendering against it
pub struct AudioContext {
    state: ContextState,
    sample_rate: u32,
    quantum: usize,
    frames_rendered: u64,
    sink: Box<dyn AudioSink>,
    graphs: BTreeMap<GraphId, Box<dyn SignalGraph>>,
    next_id: u64,
    block: AudioBuffer,
}

impl fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioContext")
            .field("state", &self.state)
            .field("sample_rate", &self.sample_rate)
            .field("current_time", &self.current_time())
            .field("sink", &self.sink.name())
            .field("graphs", &self.graphs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AudioContext {
    /// Create a suspended context rendering at `sample_rate`
    pub fn new(sample_rate: u32, sink: Box<dyn AudioSink>) -> Self {
        Self::with_quantum(sample_rate, RENDER_QUANTUM, sink)
    }

    /// Create a context with a custom render quantum
    pub fn with_quantum(sample_rate: u32, quantum: usize, sink: Box<dyn AudioSink>) -> Self {
        let sample_rate = if sample_rate == 0 {
            DEFAULT_CONTEXT_SAMPLE_RATE
        } else {
            sample_rate
        };
        let quantum = quantum.max(1);
        Self {
            state: ContextState::Suspended,
            sample_rate,
            quantum,
            frames_rendered: 0,
            sink,
            graphs: BTreeMap::new(),
            next_id: 1,
            block: AudioBuffer::new(OUTPUT_CHANNELS, quantum, sample_rate),
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ContextState::Running
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn quantum(&self) -> usize {
        self.quantum
    }

    /// Audio clock in seconds
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    // ========================================================================
    // State Control
    // ========================================================================

    /// Open the sink and start the clock
    ///
    /// Resuming a running context does nothing. A sink that cannot open is
    /// reported as `DeviceUnavailable` and the context stays suspended.
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            ContextState::Running => Ok(()),
            ContextState::Closed => Err(ResonanceError::ContextClosed),
            ContextState::Suspended => {
                self.sink
                    .open(self.sample_rate, OUTPUT_CHANNELS)
                    .map_err(|e| match e {
                        ResonanceError::DeviceUnavailable { .. } => e,
                        other => ResonanceError::DeviceUnavailable {
                            reason: other.to_string(),
                        },
                    })?;
                self.state = ContextState::Running;
                debug!(sink = self.sink.name(), time = self.current_time(), "context resumed");
                Ok(())
            }
        }
    }

    /// Freeze the clock; attached graphs are kept
    pub fn suspend(&mut self) {
        if self.state == ContextState::Running {
            self.state = ContextState::Suspended;
            debug!(time = self.current_time(), "context suspended");
        }
    }

    /// Tear down every graph, close the sink and refuse further use
    pub fn close(&mut self) -> Result<()> {
        if self.state == ContextState::Closed {
            return Ok(());
        }
        self.teardown_all();
        self.state = ContextState::Closed;
        debug!(time = self.current_time(), "context closed");
        self.sink.close()
    }

    // ========================================================================
    // Graph Management
    // ========================================================================

    /// Attach a graph; it renders from the next quantum on
    pub fn attach(&mut self, graph: Box<dyn SignalGraph>) -> Result<GraphId> {
        if self.state == ContextState::Closed {
            return Err(ResonanceError::ContextClosed);
        }
        let id = GraphId(self.next_id);
        self.next_id += 1;
        trace!(%id, label = graph.label(), "graph attached");
        self.graphs.insert(id, graph);
        Ok(id)
    }

    pub fn is_attached(&self, id: GraphId) -> bool {
        self.graphs.contains_key(&id)
    }

    pub fn graph(&self, id: GraphId) -> Option<&dyn SignalGraph> {
        self.graphs.get(&id).map(|g| g.as_ref())
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    /// Ask a graph to stop gracefully at the current time
    ///
    /// The graph stays attached until it reports itself finished. Returns
    /// false if the id is unknown.
    pub fn release(&mut self, id: GraphId) -> bool {
        let now = self.current_time();
        match self.graphs.get_mut(&id) {
            Some(graph) => {
                graph.release(now);
                true
            }
            None => false,
        }
    }

    /// Tear down and remove a graph immediately; unknown ids are ignored
    pub fn detach(&mut self, id: GraphId) -> bool {
        match self.graphs.remove(&id) {
            Some(mut graph) => {
                graph.teardown();
                trace!(%id, label = graph.label(), "graph detached");
                true
            }
            None => false,
        }
    }

    /// Tear down and remove every graph
    pub fn teardown_all(&mut self) {
        let ids: Vec<GraphId> = self.graphs.keys().copied().collect();
        for id in ids {
            self.detach(id);
        }
    }

    /// Nodes still running and connected across every graph
    pub fn active_node_count(&self) -> usize {
        self.graphs.values().map(|g| g.active_nodes()).sum()
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Render one quantum; returns the graphs that finished and were removed
    ///
    /// A suspended context renders nothing and its clock does not move.
    pub fn render_quantum(&mut self) -> Result<Vec<GraphId>> {
        match self.state {
            ContextState::Closed => return Err(ResonanceError::ContextClosed),
            ContextState::Suspended => return Ok(Vec::new()),
            ContextState::Running => {}
        }

        let start_time = self.current_time();
        self.block.clear();
        for graph in self.graphs.values_mut() {
            graph.render(start_time, &mut self.block);
        }
        self.sink.write(&self.block)?;
        self.frames_rendered += self.quantum as u64;

        let finished: Vec<GraphId> = self
            .graphs
            .iter()
            .filter(|(_, g)| g.is_finished())
            .map(|(id, _)| *id)
            .collect();
        for id in &finished {
            self.detach(*id);
        }
        Ok(finished)
    }

    /// Render whole quanta until the clock reaches `time`
    ///
    /// `time` must be finite.
    pub fn render_until(&mut self, time: f64) -> Result<Vec<GraphId>> {
        if !time.is_finite() {
            return Err(ResonanceError::invalid_parameter(
                "time",
                time,
                "a finite clock time",
            ));
        }
        let mut finished = Vec::new();
        while self.is_running() && self.current_time() < time {
            finished.extend(self.render_quantum()?);
        }
        Ok(finished)
    }

    /// Render at least `seconds` of audio from the current time
    pub fn render(&mut self, seconds: f64) -> Result<Vec<GraphId>> {
        if !seconds.is_finite() {
            return Err(ResonanceError::invalid_parameter(
                "seconds",
                seconds,
                "a finite duration",
            ));
        }
        let target = self.current_time() + seconds.max(0.0);
        self.render_until(target)
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        self.teardown_all();
    }
}
