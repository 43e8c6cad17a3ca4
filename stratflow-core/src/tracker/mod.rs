//! Indicator dependency tracker — usage search over condition trees and
//! cascading pruning when an indicator is removed from the catalogue.
//!
//! The prune is copy-on-write: a node whose tree never mentions the
//! indicator is not patched at all, so its revision stays put and
//! downstream consumers can skip it.

use crate::conditions::{strip_indicator, TreeEdit};
use crate::domain::{ConditionGroup, ConditionNode, NodeData, NodeId, NodeKind};
use crate::store::{GraphStore, StoreError};
use thiserror::Error;
use tracing::info;

/// Errors from tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("indicator '{0}' not found in any start node's catalogue")]
    IndicatorNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One node that mentions an indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageReference {
    pub node_id: NodeId,
    pub label: String,
    pub kind: NodeKind,
    /// Human-readable summary, e.g. `"2 conditions"`.
    pub context: String,
}

fn count_references(group: &ConditionGroup, key: &str) -> usize {
    group
        .children
        .iter()
        .map(|child| match child {
            ConditionNode::Group(g) => count_references(g, key),
            ConditionNode::Leaf(c) => usize::from(c.references_indicator(key)),
        })
        .sum()
}

/// Walk every signal-bearing node and report the ones whose condition
/// tree references the indicator — on either side of a comparison, in the
/// range upper bound, or anywhere inside nested math.
pub fn find_usages<S: GraphStore>(store: &S, key: &str) -> Vec<UsageReference> {
    store
        .nodes()
        .iter()
        .filter_map(|node| {
            let root = node.data.condition_root()?;
            let count = count_references(root, key);
            if count == 0 {
                return None;
            }
            Some(UsageReference {
                node_id: node.id.clone(),
                label: node.label.clone(),
                kind: node.kind(),
                context: if count == 1 {
                    "1 condition".to_string()
                } else {
                    format!("{count} conditions")
                },
            })
        })
        .collect()
}

/// Result of an indicator removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalReport {
    /// Signal-bearing nodes whose trees were rewritten.
    pub nodes_pruned: usize,
    /// Leaf conditions that disappeared.
    pub conditions_removed: usize,
}

/// Delete an indicator from the catalogue and strip every condition that
/// referenced it. Groups emptied by the strip are pruned; a tree emptied
/// entirely collapses to its (empty) root group, never to nothing.
pub fn remove_indicator<S: GraphStore>(
    store: &mut S,
    key: &str,
) -> Result<RemovalReport, TrackerError> {
    // 1. drop the catalogue entry
    let start_id = store
        .nodes()
        .iter()
        .find(|node| match &node.data {
            NodeData::Start(start) => start.indicators.contains(key),
            _ => false,
        })
        .map(|node| node.id.clone())
        .ok_or_else(|| TrackerError::IndicatorNotFound(key.to_string()))?;

    let mut start_data = store
        .node(&start_id)
        .expect("start node found above")
        .data
        .clone();
    if let NodeData::Start(start) = &mut start_data {
        start.indicators.remove(key);
    }
    store.patch_node_data(&start_id, start_data)?;

    // 2. strip dependent conditions, leaving untouched trees unpatched
    let signal_ids: Vec<NodeId> = store
        .nodes()
        .iter()
        .filter(|n| n.kind().is_signal())
        .map(|n| n.id.clone())
        .collect();

    let mut report = RemovalReport {
        nodes_pruned: 0,
        conditions_removed: 0,
    };
    for node_id in signal_ids {
        let node = store
            .node(&node_id)
            .expect("node list snapshot cannot go stale mid-pass");
        let Some(root) = node.data.condition_root() else {
            continue;
        };
        let removed = count_references(root, key);
        match strip_indicator(root, key) {
            TreeEdit::Unchanged => {}
            TreeEdit::Replaced(new_root) => {
                let mut data = node.data.clone();
                match &mut data {
                    NodeData::Signal(d) | NodeData::EntrySignal(d) | NodeData::ExitSignal(d) => {
                        d.root = new_root;
                    }
                    _ => unreachable!("is_signal() filtered above"),
                }
                store.patch_node_data(&node_id, data)?;
                report.nodes_pruned += 1;
                report.conditions_removed += removed;
            }
            TreeEdit::Removed => {
                unreachable!("the root group is never removed, only emptied")
            }
        }
    }
    info!(
        indicator = key,
        nodes = report.nodes_pruned,
        conditions = report.conditions_removed,
        "indicator removed and dependents pruned"
    );
    Ok(report)
}
