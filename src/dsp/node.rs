//! Node lifecycle shared by every processing node
//!
//! Each node moves through Created -> Running -> Stopped exactly once.
//! `stop()` on a node that already stopped is a no-op, and `disconnect()`
//! may be called any number of times, so teardown paths never have to
//! guard against double calls.

use std::fmt;

use tracing::trace;

use crate::error::{ResonanceError, Result};

/// Lifecycle state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    /// Built but not yet started
    #[default]
    Created,
    /// Started; produces or processes signal from its start time on
    Running,
    /// Stopped for good
    Stopped,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Created => write!(f, "created"),
            NodeState::Running => write!(f, "running"),
            NodeState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Tri-state lifecycle plus connection flag
#[derive(Debug, Clone, PartialEq)]
pub struct Lifecycle {
    state: NodeState,
    start_time: f64,
    stop_time: Option<f64>,
    connected: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: NodeState::Created,
            start_time: 0.0,
            stop_time: None,
            connected: true,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Created -> Running, sounding from `when`
    pub fn start(&mut self, node: &str, when: f64) -> Result<()> {
        if self.state != NodeState::Created {
            return Err(ResonanceError::InvalidNodeState {
                node: node.to_string(),
                operation: "start".to_string(),
                state: self.state.to_string(),
            });
        }
        self.state = NodeState::Running;
        self.start_time = when.max(0.0);
        Ok(())
    }

    /// Schedule the node to fall silent at `when` without stopping it yet
    pub fn stop_at(&mut self, when: f64) {
        if self.state != NodeState::Stopped {
            self.stop_time = Some(when);
        }
    }

    /// Stop immediately; returns false if the node was already stopped
    pub fn stop(&mut self) -> bool {
        if self.state == NodeState::Stopped {
            return false;
        }
        self.state = NodeState::Stopped;
        true
    }

    /// Detach from the graph; idempotent
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Running and still attached to the graph
    pub fn is_active(&self) -> bool {
        self.state == NodeState::Running && self.connected
    }

    /// Whether the node contributes signal at audio-clock `time`
    pub fn is_sounding_at(&self, time: f64) -> bool {
        self.is_active()
            && time >= self.start_time
            && self.stop_time.map_or(true, |stop| time < stop)
    }
}

/// Common surface of every node in a signal graph
pub trait Node {
    /// Node type identifier used in logs and errors
    fn kind(&self) -> &'static str;

    fn lifecycle(&self) -> &Lifecycle;

    fn lifecycle_mut(&mut self) -> &mut Lifecycle;

    fn state(&self) -> NodeState {
        self.lifecycle().state()
    }

    fn start(&mut self, when: f64) -> Result<()> {
        let kind = self.kind();
        self.lifecycle_mut().start(kind, when)
    }

    /// Stop the node; stopping an already stopped node does nothing
    fn stop(&mut self) {
        let kind = self.kind();
        if self.lifecycle_mut().stop() {
            trace!(node = kind, "node stopped");
        }
    }

    fn disconnect(&mut self) {
        self.lifecycle_mut().disconnect();
    }

    /// Stop and disconnect in one step
    fn teardown(&mut self) {
        self.stop();
        self.disconnect();
    }

    fn is_active(&self) -> bool {
        self.lifecycle().is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestNode {
        lifecycle: Lifecycle,
    }

    impl Node for TestNode {
        fn kind(&self) -> &'static str {
            "test_node"
        }
        fn lifecycle(&self) -> &Lifecycle {
            &self.lifecycle
        }
        fn lifecycle_mut(&mut self) -> &mut Lifecycle {
            &mut self.lifecycle
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut node = TestNode {
            lifecycle: Lifecycle::new(),
        };
        assert_eq!(node.state(), NodeState::Created);
        assert!(!node.is_active());

        node.start(0.5).unwrap();
        assert_eq!(node.state(), NodeState::Running);
        assert!(node.is_active());
        assert!(!node.lifecycle().is_sounding_at(0.25));
        assert!(node.lifecycle().is_sounding_at(0.5));

        node.stop();
        assert_eq!(node.state(), NodeState::Stopped);
        assert!(!node.is_active());
    }

    #[test]
    fn test_double_stop_is_noop() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.start("test_node", 0.0).unwrap();
        assert!(lifecycle.stop());
        assert!(!lifecycle.stop());
        assert_eq!(lifecycle.state(), NodeState::Stopped);
    }

    #[test]
    fn test_stop_before_start() {
        let mut node = TestNode {
            lifecycle: Lifecycle::new(),
        };
        node.teardown();
        assert_eq!(node.state(), NodeState::Stopped);
        assert!(node.start(0.0).is_err());
    }

    #[test]
    fn test_double_start_rejected() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.start("test_node", 0.0).unwrap();
        let err = lifecycle.start("test_node", 1.0).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_NODE_STATE");
    }

    #[test]
    fn test_scheduled_stop() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.start("test_node", 0.0).unwrap();
        lifecycle.stop_at(0.5);
        assert!(lifecycle.is_sounding_at(0.4));
        assert!(!lifecycle.is_sounding_at(0.5));
        // Still counts as live until actually stopped
        assert!(lifecycle.is_active());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.start("test_node", 0.0).unwrap();
        lifecycle.disconnect();
        lifecycle.disconnect();
        assert!(!lifecycle.is_connected());
        assert!(!lifecycle.is_active());
    }
}
