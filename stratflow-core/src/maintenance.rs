//! Maintenance runner — drives the reactive passes off the store's change
//! queue.
//!
//! The store queues events as writes commit; the runner drains them and
//! invokes the re-entry synchronizer (and entry-node self-healing) until
//! the queue is empty. Propagation writes queue their own events, but a
//! converged graph produces no further writes, so the loop terminates —
//! the value-comparison guard, not a lock, is what prevents write storms.
//!
//! Ordering: passes always observe the graph after the triggering write
//! has committed, never a partial state.

use crate::domain::{NodeId, NodeKind};
use crate::registry::{self, RegistryError};
use crate::store::{ChangeEvent, GraphStore, InMemoryGraphStore};
use crate::sync::{self, SyncError};
use thiserror::Error;
use tracing::warn;

/// Hard cap on drain iterations per `run_pending` call. A correct graph
/// converges in two; hitting the cap means a pass is fighting itself.
const MAX_PASSES: usize = 16;

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// What one `run_pending` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub passes: usize,
    pub writes: usize,
}

/// Drain the change queue and run every reactive pass to completion.
pub fn run_pending(store: &mut InMemoryGraphStore) -> Result<MaintenanceReport, MaintenanceError> {
    let mut report = MaintenanceReport::default();
    loop {
        let events = store.drain_events();
        if events.is_empty() {
            break;
        }
        report.passes += 1;
        if report.passes > MAX_PASSES {
            warn!("maintenance did not converge; dropping remaining events");
            break;
        }
        for event in events {
            report.writes += handle_event(store, event)?;
        }
    }
    Ok(report)
}

fn handle_event(
    store: &mut InMemoryGraphStore,
    event: ChangeEvent,
) -> Result<usize, MaintenanceError> {
    match event {
        ChangeEvent::NodePatched {
            node_id, previous, ..
        } => on_node_patched(store, &node_id, &previous),
        ChangeEvent::NodeAdded { node_id } => on_node_added(store, &node_id),
        ChangeEvent::NodeRemoved { .. } => Ok(sync::sync_all(store)?),
        // edges carry no synced state
        ChangeEvent::EdgesReplaced => Ok(0),
    }
}

/// Diff the patched node's re-entry membership against the replaced
/// payload: a slot that is newly enabled (or moved groups) joins and
/// adopts; a slot whose limit changed in place fans out.
fn on_node_patched(
    store: &mut InMemoryGraphStore,
    node_id: &NodeId,
    previous: &crate::domain::NodeData,
) -> Result<usize, MaintenanceError> {
    // the node may have been removed after the event was queued
    let Some(node) = store.node(node_id) else {
        return Ok(0);
    };
    let before = sync::member_slots(previous);
    let now = sync::member_slots(&node.data);

    let joined: Vec<sync::ReEntrySlot> = now
        .iter()
        .filter(|(slot, config)| {
            !before
                .iter()
                .any(|(s, c)| s == slot && c.group_number == config.group_number)
        })
        .map(|(slot, _)| *slot)
        .collect();
    let limit_edited = now.iter().any(|(slot, config)| {
        before.iter().any(|(s, c)| {
            s == slot
                && c.group_number == config.group_number
                && c.max_re_entries != config.max_re_entries
        })
    });

    let mut writes = 0;
    for slot in joined {
        writes += sync::on_member_joined(store, node_id, slot)?;
    }
    if limit_edited {
        writes += sync::on_limit_changed(store, node_id)?;
    }
    Ok(writes)
}

fn on_node_added(
    store: &mut InMemoryGraphStore,
    node_id: &NodeId,
) -> Result<usize, MaintenanceError> {
    let Some(node) = store.node(node_id) else {
        return Ok(0);
    };
    let is_entry = node.kind() == NodeKind::Entry;
    let slots: Vec<sync::ReEntrySlot> = sync::member_slots(&node.data)
        .into_iter()
        .map(|(slot, _)| slot)
        .collect();

    let mut writes = 0;
    if is_entry && registry::ensure_entry_position(store, node_id)?.is_some() {
        writes += 1;
    }
    // fan-in: a node arriving with enabled re-entry adopts its groups
    for slot in slots {
        writes += sync::on_member_joined(store, node_id, slot)?;
    }
    Ok(writes)
}
