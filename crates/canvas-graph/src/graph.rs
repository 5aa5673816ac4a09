use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::node::{Node, NodeId, NodeKind};
use crate::GraphError;

/// Read-only view over a node set with O(1) id lookup.
///
/// Built as a point-in-time snapshot from the store; the resolver works
/// against one consistent view for the whole payload derivation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: HashMap<NodeId, Node>,
}

impl Graph {
    pub fn new(nodes: impl IntoIterator<Item = Node>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Node by id, for callers that must fail loudly on a missing node.
    pub fn require(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.node(id).ok_or(GraphError::UnknownNode(id))
    }

    /// Parents of a node in declaration order. Dangling ids are skipped.
    pub fn parents(&self, node: &Node) -> Vec<&Node> {
        node.parent_ids
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    pub fn parents_of_kind(&self, node: &Node, kind: NodeKind) -> Vec<&Node> {
        self.parents(node)
            .into_iter()
            .filter(|p| p.kind == kind)
            .collect()
    }

    pub fn first_parent_where<'a>(
        &'a self,
        node: &Node,
        mut pred: impl FnMut(&Node) -> bool,
    ) -> Option<&'a Node> {
        self.parents(node).into_iter().find(|p| pred(p))
    }

    /// Walk upward from `start` through single-parent chains, skipping Text
    /// nodes, and return the first face image found on the chain. Stops at
    /// the first branch point or at a node with no usable image and more
    /// than one parent. Cycle-safe.
    pub fn chain_face_image(&self, start: NodeId) -> Option<String> {
        let mut visited = HashSet::new();
        let mut current = self.nodes.get(&start)?;
        loop {
            if !visited.insert(current.id) {
                return None;
            }
            if current.kind != NodeKind::Text {
                if let Some(url) = current.face_image() {
                    return Some(url.to_string());
                }
            }
            match current.parent_ids.as_slice() {
                [only] => current = self.nodes.get(only)?,
                _ => return None,
            }
        }
    }

    /// Ids of every node currently in Loading status.
    pub fn loading_ids(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.status == crate::node::NodeStatus::Loading)
            .map(|n| n.id)
            .collect()
    }
}
