//! Signal graphs and offline rendering
//!
//! A signal graph is a fixed set of nodes wired together that renders into a
//! stereo block. The voice chain, the ambient drone and the UI cues are all
//! graphs; the context mixes every attached graph additively.

use std::fmt;

use crate::engine::buffer::AudioBuffer;

/// Frames rendered per processing block
pub const RENDER_QUANTUM: usize = 128;

/// Handle for a graph attached to a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(pub u64);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph#{}", self.0)
    }
}

/// A self-contained set of nodes producing stereo output
pub trait SignalGraph: Send {
    /// Short label used in logs
    fn label(&self) -> &str;

    /// Add one block of output, starting at audio-clock `start_time`, into
    /// `out` (2 channels, `out.sample_rate` Hz)
    fn render(&mut self, start_time: f64, out: &mut AudioBuffer);

    /// Begin a graceful stop at `now`; the graph finishes on its own later
    fn release(&mut self, now: f64);

    /// Stop and disconnect every node immediately
    fn teardown(&mut self);

    /// Number of nodes still running and connected
    fn active_nodes(&self) -> usize;

    /// True once the graph will never produce sound again
    fn is_finished(&self) -> bool;
}

/// Render a graph on its own for `seconds`, starting at clock 0
///
/// Used for cue sounds and offline exports. The graph is torn down after
/// rendering.
pub fn render_graph(graph: &mut dyn SignalGraph, sample_rate: u32, seconds: f64) -> AudioBuffer {
    let total = (seconds.max(0.0) * sample_rate as f64).round() as usize;
    let mut output = AudioBuffer::new(2, 0, sample_rate);
    let mut block = AudioBuffer::new(2, RENDER_QUANTUM, sample_rate);
    let mut rendered = 0;

    while rendered < total {
        block.clear();
        let start_time = rendered as f64 / sample_rate as f64;
        graph.render(start_time, &mut block);

        let take = RENDER_QUANTUM.min(total - rendered);
        for (dst, src) in output.samples.iter_mut().zip(&block.samples) {
            dst.extend_from_slice(&src[..take]);
        }
        rendered += take;
    }

    graph.teardown();
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Graph emitting a constant level on the left channel
    struct Dc {
        level: f32,
        live: bool,
    }

    impl SignalGraph for Dc {
        fn label(&self) -> &str {
            "dc"
        }
        fn render(&mut self, _start_time: f64, out: &mut AudioBuffer) {
            if self.live {
                out.channel_mut(0).iter_mut().for_each(|s| *s += self.level);
            }
        }
        fn release(&mut self, _now: f64) {
            self.live = false;
        }
        fn teardown(&mut self) {
            self.live = false;
        }
        fn active_nodes(&self) -> usize {
            usize::from(self.live)
        }
        fn is_finished(&self) -> bool {
            !self.live
        }
    }

    #[test]
    fn test_render_graph_length_and_teardown() {
        let mut graph = Dc {
            level: 0.25,
            live: true,
        };
        let out = render_graph(&mut graph, 1000, 0.3);
        assert_eq!(out.num_channels(), 2);
        assert_eq!(out.num_samples(), 300);
        assert!(out.channel(0).iter().all(|&s| s == 0.25));
        assert!(out.channel(1).iter().all(|&s| s == 0.0));
        assert_eq!(graph.active_nodes(), 0);
    }

    #[test]
    fn test_graph_id_display() {
        assert_eq!(GraphId(3).to_string(), "graph#3");
    }
}
