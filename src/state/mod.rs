//! Circuit state arena.
//!
//! A [`CircuitState`] holds the mutable values of one simulation: one
//! [`StateNode`] per circuit occurrence, the top-level circuit first and one
//! node per instantiated sub-circuit. Nodes refer to each other by
//! [`StateId`] index; a child records its parent and the sub-circuit
//! component that owns it, and parents record children per component.
//!
//! Child nodes are created lazily the first time the engine evaluates the
//! owning sub-circuit component.

mod node;

use std::fmt;
use std::sync::Arc;

pub use node::{DriverKey, StateNode};

use crate::circuit::{Circuit, ComponentId, ElementKind, PointId};
use crate::error::{GatesimError, Result};
use crate::value::Value;

/// Index of a node in a [`CircuitState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub usize);

impl StateId {
    /// The top-level circuit's node.
    pub const ROOT: StateId = StateId(0);
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Comparable copy of every value in a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    nodes: Vec<(Vec<Value>, Vec<Vec<Value>>)>,
}

/// Mutable values of a circuit and all its instantiated sub-circuits.
#[derive(Debug)]
pub struct CircuitState {
    nodes: Vec<StateNode>,
}

impl CircuitState {
    /// Create a state for `circuit` with every value floating.
    pub fn new(circuit: Arc<Circuit>) -> Self {
        Self {
            nodes: vec![StateNode::new(circuit, None)],
        }
    }

    /// The top-level node's ID.
    pub fn root(&self) -> StateId {
        StateId::ROOT
    }

    /// The top-level circuit.
    pub fn circuit(&self) -> &Arc<Circuit> {
        self.nodes[0].circuit()
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node IDs in creation order.
    pub fn ids(&self) -> impl Iterator<Item = StateId> {
        (0..self.nodes.len()).map(StateId)
    }

    pub fn node(&self, id: StateId) -> Option<&StateNode> {
        self.nodes.get(id.0)
    }

    /// Like [`CircuitState::node`], but reports a missing node as an error.
    pub fn try_node(&self, id: StateId) -> Result<&StateNode> {
        self.nodes
            .get(id.0)
            .ok_or(GatesimError::StateNotFound { state: id.0 })
    }

    pub(crate) fn node_mut(&mut self, id: StateId) -> &mut StateNode {
        &mut self.nodes[id.0]
    }

    pub(crate) fn node_ref(&self, id: StateId) -> &StateNode {
        &self.nodes[id.0]
    }

    /// Value of the top-level bundle containing `point`.
    pub fn value(&self, point: PointId) -> Value {
        self.nodes[0].value_at(point)
    }

    /// Value of a top-level point by name.
    pub fn value_named(&self, name: &str) -> Result<Value> {
        let point = self
            .circuit()
            .find_point(name)
            .ok_or_else(|| GatesimError::point_not_found(name))?;
        Ok(self.value(point))
    }

    /// Value of `point` in any node.
    pub fn value_in(&self, state: StateId, point: PointId) -> Result<Value> {
        Ok(self.try_node(state)?.value_at(point))
    }

    /// Last value a top-level component drove on one of its pins.
    pub fn pin_value(&self, component: ComponentId, pin: usize) -> Value {
        self.nodes[0].pin_value(component, pin)
    }

    /// The child node of a sub-circuit component, creating it on first use.
    /// Returns the child and whether it was just created, or `None` when the
    /// component is not a sub-circuit.
    pub(crate) fn child_of(&mut self, parent: StateId, component: ComponentId) -> Option<(StateId, bool)> {
        if let Some(child) = self.nodes[parent.0].child(component) {
            return Some((child, false));
        }
        let ElementKind::Subcircuit(circuit) = &self.nodes[parent.0].circuit().element(component).kind else {
            return None;
        };
        let circuit = Arc::clone(circuit);
        let id = StateId(self.nodes.len());
        self.nodes.push(StateNode::new(circuit, Some((parent, component))));
        self.nodes[parent.0].set_child(component, id);
        Some((id, true))
    }

    /// Return every node to its initial values and recreate all component
    /// state. Instantiated children are kept.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.reset();
        }
    }

    /// Copy out every bundle and pin value.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            nodes: self.nodes.iter().map(StateNode::snapshot).collect(),
        }
    }
}
