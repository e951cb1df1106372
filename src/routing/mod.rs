// Routing - Acyclic signal graph between tracks, instruments and effects

pub mod graph;
pub mod node;

pub use graph::{Connection, GraphError, LinkBackend, NullBackend, RepairReport, RoutingGraph};
pub use node::{Node, NodeId, NodeKind, Port, PortLayout, PortRef, PortType};
