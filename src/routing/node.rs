// Routing nodes and typed ports
//
// A node's port lists have fixed arity and fixed types from construction on.
// Each port carries the list of peer endpoints it is connected to; an edge
// exists only when both endpoints list each other.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Signal carried by a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortType {
    Audio,
    Control,
}

/// What owns a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Track,
    Instrument,
    Effect,
}

/// One endpoint of an edge: a node and a slot in its input or output list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub slot: usize,
}

impl PortRef {
    pub fn new(node: NodeId, slot: usize) -> Self {
        Self { node, slot }
    }
}

/// A typed port and the peers it is wired to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub port_type: PortType,
    #[serde(default)]
    pub connections: Vec<PortRef>,
}

impl Port {
    pub fn new(port_type: PortType) -> Self {
        Self {
            port_type,
            connections: Vec::new(),
        }
    }
}

/// Port types a node is built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLayout {
    pub inputs: Vec<PortType>,
    pub outputs: Vec<PortType>,
}

impl PortLayout {
    pub fn new(inputs: Vec<PortType>, outputs: Vec<PortType>) -> Self {
        Self { inputs, outputs }
    }

    /// Audio in, audio out
    pub fn track() -> Self {
        Self::new(vec![PortType::Audio], vec![PortType::Audio])
    }

    /// Control in, audio out
    pub fn instrument() -> Self {
        Self::new(vec![PortType::Control], vec![PortType::Audio])
    }

    /// Audio + control in, audio out
    pub fn effect() -> Self {
        Self::new(vec![PortType::Audio, PortType::Control], vec![PortType::Audio])
    }

    pub fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Track => Self::track(),
            NodeKind::Instrument => Self::instrument(),
            NodeKind::Effect => Self::effect(),
        }
    }
}

/// A vertex of the routing graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
}

impl Node {
    pub fn new(id: NodeId, name: String, kind: NodeKind, layout: PortLayout) -> Self {
        Self {
            id,
            name,
            kind,
            inputs: layout.inputs.into_iter().map(Port::new).collect(),
            outputs: layout.outputs.into_iter().map(Port::new).collect(),
        }
    }

    /// Rebuild a node with persisted connection lists (no validation)
    pub fn from_parts(
        id: NodeId,
        name: String,
        kind: NodeKind,
        inputs: Vec<Port>,
        outputs: Vec<Port>,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            inputs,
            outputs,
        }
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut [Port] {
        &mut self.inputs
    }

    pub(crate) fn outputs_mut(&mut self) -> &mut [Port] {
        &mut self.outputs
    }

    /// Port layout with connections stripped
    pub fn layout(&self) -> PortLayout {
        PortLayout {
            inputs: self.inputs.iter().map(|p| p.port_type).collect(),
            outputs: self.outputs.iter().map(|p| p.port_type).collect(),
        }
    }

    /// Copy of this node with every connection list emptied
    pub fn detached(&self) -> Self {
        Self::new(self.id, self.name.clone(), self.kind, self.layout())
    }

    /// Number of connection entries across all ports
    pub fn connection_count(&self) -> usize {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .map(|p| p.connections.len())
            .sum()
    }
}
