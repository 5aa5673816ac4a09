use parking_lot::Mutex;
use std::collections::HashMap;

use crate::graph::Graph;
use crate::node::{Node, NodeId};

/// The shared node collection.
///
/// The lock is held only for the duration of one lookup or one field-update
/// closure; nothing async runs under it. Concurrent generations on different
/// node ids therefore never conflict.
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: Mutex<HashMap<NodeId, Node>>,
}

impl NodeStore {
    pub fn new(nodes: impl IntoIterator<Item = Node>) -> Self {
        Self {
            nodes: Mutex::new(nodes.into_iter().map(|n| (n.id, n)).collect()),
        }
    }

    pub fn insert(&self, node: Node) {
        self.nodes.lock().insert(node.id, node);
    }

    pub fn get(&self, id: NodeId) -> Option<Node> {
        self.nodes.lock().get(&id).cloned()
    }

    /// Apply one atomic set of field updates to a node. Returns false when
    /// the node no longer exists (deleted by the canvas layer mid-flight).
    pub fn update(&self, id: NodeId, f: impl FnOnce(&mut Node)) -> bool {
        let mut nodes = self.nodes.lock();
        match nodes.get_mut(&id) {
            Some(node) => {
                f(node);
                true
            }
            None => false,
        }
    }

    /// Point-in-time snapshot of the whole graph.
    pub fn graph(&self) -> Graph {
        Graph {
            nodes: self.nodes.lock().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}
