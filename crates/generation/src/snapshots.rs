/// Cancellation snapshots
///
/// A point-in-time copy of a node's visible generation state, captured just
/// before a call is dispatched. One slot per node id; a new generation
/// overwrites the previous snapshot.
use parking_lot::Mutex;
use std::collections::HashMap;

use canvas_graph::{Node, NodeId, NodeStatus, VariationSlot};

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub status: NodeStatus,
    pub result_url: Option<String>,
    pub result_urls: Option<Vec<String>>,
    pub carousel_index: usize,
    pub image_variations: Option<Vec<VariationSlot>>,
    pub error_message: Option<String>,
}

impl NodeSnapshot {
    pub fn of(node: &Node) -> Self {
        Self {
            status: node.status,
            result_url: node.result_url.clone(),
            result_urls: node.result_urls.clone(),
            carousel_index: node.carousel_index,
            image_variations: node.image_variations.clone(),
            error_message: node.error_message.clone(),
        }
    }

    /// Write the snapshot back onto a node, exactly the captured fields.
    pub fn restore_onto(&self, node: &mut Node) {
        node.status = self.status;
        node.result_url = self.result_url.clone();
        node.result_urls = self.result_urls.clone();
        node.carousel_index = self.carousel_index;
        node.image_variations = self.image_variations.clone();
        node.error_message = self.error_message.clone();
        node.generation_start_time = None;
    }

    /// Blank state for a cancel with no snapshot on file.
    pub fn reset_onto(node: &mut Node) {
        node.status = NodeStatus::Idle;
        node.result_url = None;
        node.result_urls = None;
        node.carousel_index = 0;
        node.image_variations = None;
        node.error_message = None;
        node.generation_start_time = None;
    }
}

#[derive(Debug, Default)]
pub struct SnapshotTable {
    snapshots: Mutex<HashMap<NodeId, NodeSnapshot>>,
}

impl SnapshotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, id: NodeId, snapshot: NodeSnapshot) {
        self.snapshots.lock().insert(id, snapshot);
    }

    /// Take and remove the snapshot for a node, if any.
    pub fn restore(&self, id: NodeId) -> Option<NodeSnapshot> {
        self.snapshots.lock().remove(&id)
    }

    pub fn clear(&self, id: NodeId) {
        self.snapshots.lock().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_graph::NodeKind;

    #[test]
    fn test_snapshot_roundtrip() {
        let mut node = Node::new(NodeKind::Image);
        node.status = NodeStatus::Success;
        node.result_url = Some("a.png".to_string());
        node.result_urls = Some(vec!["a.png".to_string(), "b.png".to_string()]);
        node.carousel_index = 1;
        node.error_message = Some("stale".to_string());

        let snapshot = NodeSnapshot::of(&node);
        let mut mutated = node.clone();
        mutated.status = NodeStatus::Loading;
        mutated.result_urls = Some(vec!["c.png".to_string()]);
        mutated.carousel_index = 0;
        mutated.generation_start_time = Some(chrono::Utc::now());

        snapshot.restore_onto(&mut mutated);
        assert_eq!(mutated.status, NodeStatus::Success);
        assert_eq!(mutated.result_urls, node.result_urls);
        assert_eq!(mutated.carousel_index, 1);
        assert_eq!(mutated.error_message.as_deref(), Some("stale"));
        assert!(mutated.generation_start_time.is_none());
    }

    #[test]
    fn test_table_single_slot_overwrite() {
        let table = SnapshotTable::new();
        let node = Node::new(NodeKind::Image);
        let id = node.id;

        table.save(id, NodeSnapshot::of(&node));
        let mut second = node.clone();
        second.result_url = Some("newer.png".to_string());
        table.save(id, NodeSnapshot::of(&second));

        let restored = table.restore(id).unwrap();
        assert_eq!(restored.result_url.as_deref(), Some("newer.png"));
        // Consumed on restore.
        assert!(table.restore(id).is_none());
    }

    #[test]
    fn test_reset_blanks_node() {
        let mut node = Node::new(NodeKind::Image);
        node.status = NodeStatus::Error;
        node.result_url = Some("a.png".to_string());
        node.error_message = Some("bad".to_string());

        NodeSnapshot::reset_onto(&mut node);
        assert_eq!(node.status, NodeStatus::Idle);
        assert!(node.result_url.is_none());
        assert!(node.error_message.is_none());
    }
}
