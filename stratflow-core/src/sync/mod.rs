//! Re-entry group synchronizer — cross-node convergence of shared
//! re-entry limits.
//!
//! Retry nodes and exit-node risk features that enable re-entry under the
//! same group number must present one logical `max_re_entries`, even
//! though each node stores its own copy. Three entry points:
//!
//! - `on_limit_changed` — fan-out: the edited node's value propagates to
//!   every other member of its group(s).
//! - `on_member_joined` — fan-in: a freshly enabled member adopts the
//!   group's existing value (the group wins over the newcomer's default).
//! - `sync_all` — full-list pass after imports or node removal; the
//!   authoritative member is chosen by highest store revision, ties
//!   broken by greatest node id, then slot order.
//!
//! Every propagation compares the proposed value against the current one
//! before writing, and the store suppresses content-identical patches, so
//! a converged graph produces zero writes and zero change events —
//! re-running any pass is a no-op and a propagation write cannot
//! re-trigger the pass that issued it.

use crate::domain::{NodeData, NodeId, ReEntryConfig, RiskFeature};
use crate::store::{GraphStore, StoreError};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from synchronizer passes. Unknown node ids are caller bugs.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where a node stores one of its re-entry configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReEntrySlot {
    /// A retry node's direct config.
    Retry,
    /// Nested inside an exit node's risk feature.
    Feature(RiskFeature),
}

impl ReEntrySlot {
    /// Deterministic ordering used for tie-breaks within one node.
    fn rank(self) -> u8 {
        match self {
            ReEntrySlot::Retry => 0,
            ReEntrySlot::Feature(RiskFeature::StopLoss) => 1,
            ReEntrySlot::Feature(RiskFeature::TrailingStop) => 2,
            ReEntrySlot::Feature(RiskFeature::TakeProfit) => 3,
        }
    }
}

/// A node's enabled re-entry configs, in slot order.
pub(crate) fn member_slots(data: &NodeData) -> Vec<(ReEntrySlot, ReEntryConfig)> {
    let mut slots = Vec::new();
    match data {
        NodeData::Retry(retry) => {
            if retry.re_entry.enabled {
                slots.push((ReEntrySlot::Retry, retry.re_entry));
            }
        }
        NodeData::Exit(exit) => {
            for feature in RiskFeature::ALL {
                if let Some(re_entry) = exit.post_execution.feature(feature).re_entry {
                    if re_entry.enabled {
                        slots.push((ReEntrySlot::Feature(feature), re_entry));
                    }
                }
            }
        }
        _ => {}
    }
    slots
}

/// Set `max_re_entries` on every enabled config of the node that belongs
/// to `group`. Returns whether anything actually changed.
fn apply_limit(data: &mut NodeData, group: u32, value: u32) -> bool {
    fn touch(re: &mut ReEntryConfig, group: u32, value: u32) -> bool {
        if re.enabled && re.group_number == group && re.max_re_entries != value {
            re.max_re_entries = value;
            true
        } else {
            false
        }
    }

    let mut changed = false;
    match data {
        NodeData::Retry(retry) => {
            changed |= touch(&mut retry.re_entry, group, value);
        }
        NodeData::Exit(exit) => {
            for feature in RiskFeature::ALL {
                if let Some(re) = exit.post_execution.feature_mut(feature).re_entry.as_mut() {
                    changed |= touch(re, group, value);
                }
            }
        }
        _ => {}
    }
    changed
}

/// The group's authoritative limit, excluding one node if asked.
///
/// Deterministic rule for the otherwise-unordered case: the member whose
/// node has the highest revision wins; equal revisions break ties by
/// greatest node id, then slot order within the node.
fn authoritative_value<S: GraphStore>(
    store: &S,
    group: u32,
    excluding: Option<&NodeId>,
) -> Option<u32> {
    use std::cmp::Reverse;

    let mut best: Option<((u64, NodeId, Reverse<u8>), u32)> = None;
    for node in store.nodes() {
        if excluding == Some(&node.id) {
            continue;
        }
        let revision = store.revision(&node.id).unwrap_or(0);
        for (slot, config) in member_slots(&node.data) {
            if config.group_number != group {
                continue;
            }
            let key = (revision, node.id.clone(), Reverse(slot.rank()));
            let better = match &best {
                None => true,
                Some((k, _)) => key > *k,
            };
            if better {
                best = Some((key, config.max_re_entries));
            }
        }
    }
    best.map(|(_, value)| value)
}

/// Propagate `value` for `group` to every member node. Returns the number
/// of nodes written.
fn propagate<S: GraphStore>(
    store: &mut S,
    group: u32,
    value: u32,
    skip: Option<&NodeId>,
) -> Result<usize, SyncError> {
    let targets: Vec<NodeId> = store.nodes().iter().map(|n| n.id.clone()).collect();
    let mut writes = 0;
    for target in targets {
        if skip == Some(&target) {
            continue;
        }
        let node = store
            .node(&target)
            .ok_or_else(|| SyncError::NodeNotFound(target.clone()))?;
        let mut data = node.data.clone();
        if apply_limit(&mut data, group, value) {
            store.patch_node_data(&target, data)?;
            writes += 1;
            info!(node = %target, group, value, "re-entry limit propagated");
        }
    }
    Ok(writes)
}

/// Fan-out: the changed node's limits become authoritative for every
/// group it participates in. Last writer wins; within one node, slot
/// order picks the value when two of its own slots in the same group
/// disagree.
pub fn on_limit_changed<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
) -> Result<usize, SyncError> {
    let node = store
        .node(node_id)
        .ok_or_else(|| SyncError::NodeNotFound(node_id.clone()))?;
    let mut authority: BTreeMap<u32, u32> = BTreeMap::new();
    for (_, config) in member_slots(&node.data) {
        authority
            .entry(config.group_number)
            .or_insert(config.max_re_entries);
    }
    let mut writes = 0;
    for (group, value) in authority {
        writes += propagate(store, group, value, None)?;
    }
    if writes == 0 {
        debug!(node = %node_id, "re-entry groups already converged");
    }
    Ok(writes)
}

/// Fan-in: a freshly enabled member adopts the existing group value
/// instead of overwriting it. A member that opens a brand-new group keeps
/// its own limit.
pub fn on_member_joined<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
    slot: ReEntrySlot,
) -> Result<usize, SyncError> {
    let node = store
        .node(node_id)
        .ok_or_else(|| SyncError::NodeNotFound(node_id.clone()))?;
    let Some((_, config)) = member_slots(&node.data).into_iter().find(|(s, _)| *s == slot) else {
        // the slot was disabled again before the pass ran; nothing to do
        return Ok(0);
    };
    let group = config.group_number;
    let Some(value) = authoritative_value(store, group, Some(node_id)) else {
        debug!(node = %node_id, group, "first member of its re-entry group");
        return Ok(0);
    };
    if value == config.max_re_entries {
        return Ok(0);
    }
    let mut data = node.data.clone();
    if apply_limit(&mut data, group, value) {
        store.patch_node_data(node_id, data)?;
        info!(node = %node_id, group, value, "joined re-entry group, adopted its limit");
        return Ok(1);
    }
    Ok(0)
}

/// Full-list convergence pass, run when the node list itself changes
/// (import, node removal). Idempotent: a second run performs zero writes.
pub fn sync_all<S: GraphStore>(store: &mut S) -> Result<usize, SyncError> {
    let mut groups: BTreeSet<u32> = BTreeSet::new();
    for node in store.nodes() {
        for (_, config) in member_slots(&node.data) {
            groups.insert(config.group_number);
        }
    }
    let mut writes = 0;
    for group in groups {
        let Some(value) = authoritative_value(store, group, None) else {
            continue;
        };
        writes += propagate(store, group, value, None)?;
    }
    Ok(writes)
}
