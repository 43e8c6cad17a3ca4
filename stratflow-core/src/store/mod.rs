//! Graph store — canonical holder of nodes and edges.
//!
//! The store is the only shared mutable resource in the core. It manages:
//! - Node/edge storage and lookup
//! - Whole-data node patches with content-hash change suppression
//! - Per-node revision counters (replaces "last updated" timestamps)
//! - A change-event queue drained by the maintenance runner
//! - Snapshot-based undo history
//!
//! A patch whose payload hashes identically to the stored data is a no-op:
//! no revision moves and no event is queued. This is what makes the
//! synchronizer's propagation writes safe — a converged write cannot
//! re-trigger the pass that issued it.

use crate::domain::{Edge, Node, NodeData, NodeId, PositionId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::debug;

/// Errors from store operations. These indicate caller bugs, not user
/// data problems, and propagate loudly.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("node {0} already exists")]
    DuplicateNodeId(NodeId),
}

/// Result of a node patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The payload differed; the node's revision advanced to this value.
    Changed { revision: u64 },
    /// The payload was content-identical; nothing was written.
    Unchanged,
}

impl PatchOutcome {
    pub fn changed(self) -> bool {
        matches!(self, PatchOutcome::Changed { .. })
    }
}

/// Change notification queued by the store and drained by the maintenance
/// runner after the triggering write has committed.
///
/// `NodePatched` carries the replaced payload so reactive passes can diff
/// membership-style state (e.g. re-entry group joins) without holding
/// their own copy of the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    NodePatched {
        node_id: NodeId,
        revision: u64,
        previous: Box<NodeData>,
    },
    NodeAdded {
        node_id: NodeId,
    },
    NodeRemoved {
        node_id: NodeId,
    },
    EdgesReplaced,
}

/// Read/patch contract consumed by every component. Components receive a
/// store handle explicitly — no module-level singleton — so unit tests can
/// substitute a minimal fake.
pub trait GraphStore {
    fn nodes(&self) -> &[Node];
    fn edges(&self) -> &[Edge];
    fn node(&self, id: &NodeId) -> Option<&Node>;
    /// Monotonic per-node change counter. Starts at 1 on insert.
    fn revision(&self, id: &NodeId) -> Option<u64>;
    /// Replace a node's whole data payload. Content-identical payloads are
    /// suppressed and reported as `Unchanged`.
    fn patch_node_data(&mut self, id: &NodeId, data: NodeData) -> Result<PatchOutcome, StoreError>;
    fn set_edges(&mut self, edges: Vec<Edge>);
    /// Allocate a process-unique position id.
    fn next_position_id(&mut self) -> PositionId;
}

/// Content hash of a node payload — canonical JSON through blake3.
fn hash_data(data: &NodeData) -> blake3::Hash {
    let json = serde_json::to_vec(data).expect("NodeData must serialize");
    blake3::hash(&json)
}

/// One undo snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryEntry {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

/// The in-memory store used by the editors and maintenance passes.
pub struct InMemoryGraphStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    revisions: HashMap<NodeId, u64>,
    hashes: HashMap<NodeId, blake3::Hash>,
    events: VecDeque<ChangeEvent>,
    history: Vec<HistoryEntry>,
    position_seq: u64,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            revisions: HashMap::new(),
            hashes: HashMap::new(),
            events: VecDeque::new(),
            history: Vec::new(),
            position_seq: 0,
        }
    }

    /// Build a store from imported state. Seeds the position-id counter
    /// above every id present so future allocations stay unique.
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for node in nodes {
            store.add_node(node)?;
        }
        store.edges = edges;
        store.events.clear();
        Ok(store)
    }

    /// Insert a new node. Fails loudly on a duplicate id.
    pub fn add_node(&mut self, node: Node) -> Result<(), StoreError> {
        if self.revisions.contains_key(&node.id) {
            return Err(StoreError::DuplicateNodeId(node.id));
        }
        let max_pos = node
            .data
            .positions()
            .into_iter()
            .flatten()
            .map(|p| p.id.0)
            .max()
            .unwrap_or(0);
        self.position_seq = self.position_seq.max(max_pos);
        self.revisions.insert(node.id.clone(), 1);
        self.hashes.insert(node.id.clone(), hash_data(&node.data));
        self.events.push_back(ChangeEvent::NodeAdded {
            node_id: node.id.clone(),
        });
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node. Edges touching it are dropped with it.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<Node, StoreError> {
        let index = self
            .nodes
            .iter()
            .position(|n| &n.id == id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
        let node = self.nodes.remove(index);
        self.revisions.remove(id);
        self.hashes.remove(id);
        self.edges
            .retain(|e| &e.source != id && &e.target != id);
        self.events
            .push_back(ChangeEvent::NodeRemoved { node_id: id.clone() });
        Ok(node)
    }

    /// Push the current committed state onto the undo stack.
    pub fn append_history(&mut self) {
        self.history.push(HistoryEntry {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        });
    }

    /// Restore the most recent snapshot. Returns false when the stack is
    /// empty. Revisions advance for every node whose content changed.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.history.pop() else {
            return false;
        };
        self.edges = entry.edges;
        let restored = entry.nodes;
        let old_ids: Vec<NodeId> = self.nodes.iter().map(|n| n.id.clone()).collect();
        for id in old_ids {
            if !restored.iter().any(|n| n.id == id) {
                self.revisions.remove(&id);
                self.hashes.remove(&id);
            }
        }
        for node in &restored {
            let hash = hash_data(&node.data);
            match self.hashes.get(&node.id) {
                Some(existing) if *existing == hash => {}
                _ => {
                    let previous = self.nodes.iter().find(|n| n.id == node.id);
                    let rev = self.revisions.entry(node.id.clone()).or_insert(0);
                    *rev += 1;
                    let revision = *rev;
                    self.hashes.insert(node.id.clone(), hash);
                    self.events.push_back(match previous {
                        Some(prev) => ChangeEvent::NodePatched {
                            node_id: node.id.clone(),
                            revision,
                            previous: Box::new(prev.data.clone()),
                        },
                        // removed after the snapshot; undo re-adds it
                        None => ChangeEvent::NodeAdded {
                            node_id: node.id.clone(),
                        },
                    });
                }
            }
        }
        self.nodes = restored;
        true
    }

    /// Drain queued change events for the maintenance runner.
    pub fn drain_events(&mut self) -> Vec<ChangeEvent> {
        self.events.drain(..).collect()
    }

    pub fn into_parts(self) -> (Vec<Node>, Vec<Edge>) {
        (self.nodes, self.edges)
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore for InMemoryGraphStore {
    fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn edges(&self) -> &[Edge] {
        &self.edges
    }

    fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    fn revision(&self, id: &NodeId) -> Option<u64> {
        self.revisions.get(id).copied()
    }

    fn patch_node_data(&mut self, id: &NodeId, data: NodeData) -> Result<PatchOutcome, StoreError> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;

        let new_hash = hash_data(&data);
        if self.hashes.get(id) == Some(&new_hash) {
            debug!(node = %id, "patch suppressed: content-identical payload");
            return Ok(PatchOutcome::Unchanged);
        }

        let previous = std::mem::replace(&mut node.data, data);
        self.hashes.insert(id.clone(), new_hash);
        let rev = self.revisions.entry(id.clone()).or_insert(0);
        *rev += 1;
        let revision = *rev;
        self.events.push_back(ChangeEvent::NodePatched {
            node_id: id.clone(),
            revision,
            previous: Box::new(previous),
        });
        Ok(PatchOutcome::Changed { revision })
    }

    fn set_edges(&mut self, edges: Vec<Edge>) {
        if self.edges == edges {
            return;
        }
        self.edges = edges;
        self.events.push_back(ChangeEvent::EdgesReplaced);
    }

    fn next_position_id(&mut self) -> PositionId {
        self.position_seq += 1;
        PositionId(self.position_seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionData, ExitData, Node, NodeData};

    fn entry_node(id: &str) -> Node {
        Node::new(id, "", NodeData::Entry(ActionData::default()))
    }

    #[test]
    fn identical_patch_is_suppressed() {
        let mut store = InMemoryGraphStore::new();
        store.add_node(entry_node("n1")).unwrap();
        store.drain_events();

        let data = store.node(&"n1".into()).unwrap().data.clone();
        let outcome = store.patch_node_data(&"n1".into(), data).unwrap();
        assert_eq!(outcome, PatchOutcome::Unchanged);
        assert_eq!(store.revision(&"n1".into()), Some(1));
        assert!(store.drain_events().is_empty());
    }

    #[test]
    fn real_patch_advances_revision_and_queues_event() {
        let mut store = InMemoryGraphStore::new();
        store.add_node(entry_node("n1")).unwrap();
        store.drain_events();

        let outcome = store
            .patch_node_data(&"n1".into(), NodeData::Exit(ExitData::default()))
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Changed { revision: 2 });
        let events = store.drain_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChangeEvent::NodePatched {
                node_id,
                revision,
                previous,
            } => {
                assert_eq!(node_id, &NodeId::from("n1"));
                assert_eq!(*revision, 2);
                // the event carries the replaced payload
                assert_eq!(previous.kind(), crate::domain::NodeKind::Entry);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn patching_missing_node_fails_loudly() {
        let mut store = InMemoryGraphStore::new();
        let err = store
            .patch_node_data(&"ghost".into(), NodeData::End)
            .unwrap_err();
        assert!(matches!(err, StoreError::NodeNotFound(_)));
    }

    #[test]
    fn duplicate_node_id_rejected() {
        let mut store = InMemoryGraphStore::new();
        store.add_node(entry_node("n1")).unwrap();
        assert!(matches!(
            store.add_node(entry_node("n1")),
            Err(StoreError::DuplicateNodeId(_))
        ));
    }

    #[test]
    fn undo_restores_snapshot_and_bumps_changed_revisions() {
        let mut store = InMemoryGraphStore::new();
        store.add_node(entry_node("n1")).unwrap();
        store.append_history();
        store
            .patch_node_data(&"n1".into(), NodeData::Exit(ExitData::default()))
            .unwrap();
        store.drain_events();

        assert!(store.undo());
        assert_eq!(store.node(&"n1".into()).unwrap().kind().to_string(), "entry");
        // content changed back, so the revision moved again
        assert_eq!(store.revision(&"n1".into()), Some(3));
        assert!(!store.undo());
    }

    #[test]
    fn removing_node_drops_its_edges() {
        let mut store = InMemoryGraphStore::new();
        store.add_node(entry_node("a")).unwrap();
        store.add_node(entry_node("b")).unwrap();
        store.set_edges(vec![Edge::new("a", "b")]);
        store.remove_node(&"a".into()).unwrap();
        assert!(store.edges().is_empty());
        assert!(store.node(&"a".into()).is_none());
    }

    #[test]
    fn position_ids_are_process_unique() {
        let mut store = InMemoryGraphStore::new();
        let a = store.next_position_id();
        let b = store.next_position_id();
        assert_ne!(a, b);
    }
}
