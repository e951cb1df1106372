// Routing graph - Directed acyclic node/port graph
//
// Nodes live in an arena keyed by NodeId; edges are stored as mirrored entries
// in the two endpoints' port lists. Every mutation either fully succeeds or
// leaves the graph untouched, and `connect` refuses any edge that would close
// a cycle.

use super::node::{Node, NodeId, PortRef, PortType};
use std::collections::{HashMap, HashSet};

/// Routing errors (topology and reference failures)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("port {slot} out of range on node {node}")]
    PortOutOfRange { node: NodeId, slot: usize },

    #[error("cannot connect {from:?} output to {to:?} input")]
    PortTypeMismatch { from: PortType, to: PortType },

    #[error("connection {src} -> {dst} would create a cycle")]
    WouldCreateCycle { src: NodeId, dst: NodeId },

    #[error("connection already exists")]
    DuplicateConnection,

    #[error("nodes are not connected")]
    NotConnected,
}

/// A fully specified edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub src: NodeId,
    pub output: usize,
    pub dst: NodeId,
    pub input: usize,
}

impl Connection {
    pub fn new(src: NodeId, output: usize, dst: NodeId, input: usize) -> Self {
        Self {
            src,
            output,
            dst,
            input,
        }
    }
}

/// Low-level link callback into the synthesis backend
///
/// Contract: the backend may be unable to remove one link in isolation, so
/// after a disconnect the graph calls `unlink_output` for the whole output and
/// then `link` again for every connection still listed on it.
pub trait LinkBackend: Send {
    /// Wire one audio connection
    fn link(&mut self, connection: Connection);

    /// Remove every low-level link leaving `output` of `node`
    fn unlink_output(&mut self, node: NodeId, output: usize);
}

/// Backend that wires nothing (headless sessions, tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl LinkBackend for NullBackend {
    fn link(&mut self, _connection: Connection) {}

    fn unlink_output(&mut self, _node: NodeId, _output: usize) {}
}

/// Outcome of [`RoutingGraph::repair`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// One-sided or invalid entries dropped
    pub pruned: usize,
    /// Connections replayed through the backend
    pub relinked: usize,
}

/// Routing graph
pub struct RoutingGraph {
    nodes: HashMap<NodeId, Node>,
    backend: Box<dyn LinkBackend>,
}

impl RoutingGraph {
    /// Create new empty routing graph
    pub fn new(backend: Box<dyn LinkBackend>) -> Self {
        Self {
            nodes: HashMap::new(),
            backend,
        }
    }

    /// Add a node (its connection lists are taken as-is)
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        let id = node.id;
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Unlink every edge touching `id`, then remove the node
    ///
    /// Returns the detached node and the edges that were removed.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(Node, Vec<Connection>), GraphError> {
        let edges = self.connections_of(id)?;
        for edge in &edges {
            self.disconnect(*edge)?;
        }
        let node = self.nodes.remove(&id).ok_or(GraphError::UnknownNode(id))?;
        Ok((node, edges))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Validate and add an edge
    pub fn connect(&mut self, connection: Connection) -> Result<(), GraphError> {
        self.check_connect(connection)?;

        let Connection {
            src,
            output,
            dst,
            input,
        } = connection;
        if let Some(node) = self.nodes.get_mut(&src) {
            node.outputs_mut()[output]
                .connections
                .push(PortRef::new(dst, input));
        }
        if let Some(node) = self.nodes.get_mut(&dst) {
            node.inputs_mut()[input]
                .connections
                .push(PortRef::new(src, output));
        }

        self.link(connection);
        log::debug!("Connected {}:{} -> {}:{}", src, output, dst, input);
        Ok(())
    }

    /// Remove an edge from both endpoints, then rebuild the output's low-level links
    pub fn disconnect(&mut self, connection: Connection) -> Result<(), GraphError> {
        let Connection {
            src,
            output,
            dst,
            input,
        } = connection;
        self.port_type(src, output, true)?;
        self.port_type(dst, input, false)?;
        if !self.is_connected(connection) {
            return Err(GraphError::NotConnected);
        }

        if let Some(node) = self.nodes.get_mut(&src) {
            node.outputs_mut()[output]
                .connections
                .retain(|p| *p != PortRef::new(dst, input));
        }
        if let Some(node) = self.nodes.get_mut(&dst) {
            node.inputs_mut()[input]
                .connections
                .retain(|p| *p != PortRef::new(src, output));
        }

        self.relink_output(src, output);
        log::debug!("Disconnected {}:{} -> {}:{}", src, output, dst, input);
        Ok(())
    }

    /// Check whether an edge is present (on the source side)
    pub fn is_connected(&self, connection: Connection) -> bool {
        self.nodes
            .get(&connection.src)
            .and_then(|n| n.outputs().get(connection.output))
            .is_some_and(|p| {
                p.connections
                    .contains(&PortRef::new(connection.dst, connection.input))
            })
    }

    /// Every edge, read from the source side
    pub fn connections(&self) -> Vec<Connection> {
        let mut edges: Vec<Connection> = self
            .nodes
            .values()
            .flat_map(|node| {
                node.outputs().iter().enumerate().flat_map(move |(slot, port)| {
                    port.connections
                        .iter()
                        .map(move |peer| Connection::new(node.id, slot, peer.node, peer.slot))
                })
            })
            .collect();
        edges.sort_by_key(|c| (c.src, c.output, c.dst, c.input));
        edges
    }

    /// Edges entering or leaving `id`
    pub fn connections_of(&self, id: NodeId) -> Result<Vec<Connection>, GraphError> {
        let node = self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))?;
        let mut edges = Vec::new();
        for (slot, port) in node.outputs().iter().enumerate() {
            for peer in &port.connections {
                edges.push(Connection::new(id, slot, peer.node, peer.slot));
            }
        }
        for (slot, port) in node.inputs().iter().enumerate() {
            for peer in &port.connections {
                let edge = Connection::new(peer.node, peer.slot, id, slot);
                if !edges.contains(&edge) {
                    edges.push(edge);
                }
            }
        }
        Ok(edges)
    }

    /// Check if adding src -> dst would create a cycle
    pub fn would_create_cycle(&self, src: NodeId, dst: NodeId) -> bool {
        self.has_path(dst, src)
    }

    /// Iterative depth-first reachability over output edges
    ///
    /// The visited set keeps this finite even on an already inconsistent graph.
    pub fn has_path(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                for port in node.outputs() {
                    for peer in &port.connections {
                        if !visited.contains(&peer.node) {
                            stack.push(peer.node);
                        }
                    }
                }
            }
        }
        false
    }

    /// Prune one-sided entries and replay every surviving edge through the backend
    ///
    /// Run once after bulk import. Surviving edges are re-validated in order, so
    /// an edge that is mistyped, duplicated, or closes a cycle is dropped as well.
    pub fn repair(&mut self) -> RepairReport {
        let mut report = RepairReport::default();

        // Collect edges listed on both sides
        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        for node in self.nodes.values() {
            for (slot, port) in node.outputs().iter().enumerate() {
                for peer in &port.connections {
                    let edge = Connection::new(node.id, slot, peer.node, peer.slot);
                    if self.mirrored(edge) && seen.insert(edge) {
                        candidates.push(edge);
                    }
                }
            }
        }
        candidates.sort_by_key(|c| (c.src, c.output, c.dst, c.input));

        let total_entries: usize = self.nodes.values().map(Node::connection_count).sum();

        for node in self.nodes.values_mut() {
            for port in node.inputs_mut() {
                port.connections.clear();
            }
            for port in node.outputs_mut() {
                port.connections.clear();
            }
        }

        // Each edge accounts for two entries
        let mut restored = 0;
        for edge in candidates {
            match self.connect(edge) {
                Ok(()) => restored += 1,
                Err(e) => log::warn!(
                    "Dropping persisted connection {}:{} -> {}:{}: {}",
                    edge.src,
                    edge.output,
                    edge.dst,
                    edge.input,
                    e
                ),
            }
        }

        report.pruned = total_entries - restored * 2;
        report.relinked = restored;
        if report.pruned > 0 {
            log::warn!("Routing repair pruned {} dangling entries", report.pruned);
        }
        log::info!("Routing repair replayed {} connections", report.relinked);
        report
    }

    fn mirrored(&self, edge: Connection) -> bool {
        self.nodes
            .get(&edge.dst)
            .and_then(|n| n.inputs().get(edge.input))
            .is_some_and(|p| p.connections.contains(&PortRef::new(edge.src, edge.output)))
    }

    fn check_connect(&self, connection: Connection) -> Result<(), GraphError> {
        let Connection {
            src,
            output,
            dst,
            input,
        } = connection;
        let from = self.port_type(src, output, true)?;
        let to = self.port_type(dst, input, false)?;
        if from != to {
            return Err(GraphError::PortTypeMismatch { from, to });
        }
        if src == dst || self.would_create_cycle(src, dst) {
            return Err(GraphError::WouldCreateCycle { src, dst });
        }
        if self.is_connected(connection) {
            return Err(GraphError::DuplicateConnection);
        }
        Ok(())
    }

    fn port_type(&self, node: NodeId, slot: usize, output: bool) -> Result<PortType, GraphError> {
        let n = self.nodes.get(&node).ok_or(GraphError::UnknownNode(node))?;
        let ports = if output { n.outputs() } else { n.inputs() };
        ports
            .get(slot)
            .map(|p| p.port_type)
            .ok_or(GraphError::PortOutOfRange { node, slot })
    }

    fn link(&mut self, connection: Connection) {
        // Control ports are reserved; only audio reaches the backend
        if let Ok(PortType::Audio) = self.port_type(connection.src, connection.output, true) {
            self.backend.link(connection);
        }
    }

    fn relink_output(&mut self, node: NodeId, output: usize) {
        let Ok(PortType::Audio) = self.port_type(node, output, true) else {
            return;
        };
        self.backend.unlink_output(node, output);
        let survivors: Vec<PortRef> = self
            .nodes
            .get(&node)
            .map(|n| n.outputs()[output].connections.clone())
            .unwrap_or_default();
        for peer in survivors {
            self.backend
                .link(Connection::new(node, output, peer.node, peer.slot));
        }
    }
}

impl Default for RoutingGraph {
    fn default() -> Self {
        Self::new(Box::new(NullBackend))
    }
}
