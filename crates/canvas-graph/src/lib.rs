/// Canvas graph data model
///
/// Nodes form a directed graph: each node lists the parents whose output it
/// consumes. Generation state lives on the node itself; the store is the one
/// shared mutable resource and every mutation is a single atomic closure.
pub mod graph;
pub mod node;
pub mod store;

pub use graph::Graph;
pub use node::{
    GenerationSettings, Node, NodeId, NodeKind, NodeStatus, SlotStatus, VariationSlot, VideoMode,
};
pub use store::NodeStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
}
