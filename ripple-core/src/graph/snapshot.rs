//! Graph Snapshots
//!
//! A point-in-time, owned copy of the graph's shape for debugging and tests.
//! Snapshots serialize with serde, so they can be dumped as JSON.

use serde::Serialize;

use super::node::{Flags, NodeId, NodeKind};
use super::Graph;

/// One node in a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub flags: Flags,
    /// Nodes this one read during its last run, in read order.
    pub dependencies: Vec<NodeId>,
    /// Nodes currently reading this one, in subscription order.
    pub subscribers: Vec<NodeId>,
}

/// The whole graph of one runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub link_count: usize,
    /// Effects queued but not yet notified.
    pub queued: Vec<NodeId>,
}

impl GraphSnapshot {
    /// Look up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Graph {
    pub(crate) fn snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .nodes
            .iter()
            .map(|(index, node)| {
                let id = NodeId::new(index);
                NodeSnapshot {
                    id,
                    kind: node.kind,
                    flags: node.flags,
                    dependencies: self.dependencies(id),
                    subscribers: self.subscribers(id),
                }
            })
            .collect();

        GraphSnapshot {
            nodes,
            link_count: self.link_count(),
            queued: self.queue.iter().collect(),
        }
    }
}
