//! Position registry — per-action-node ordered position sets with
//! identity rules enforced across the whole graph.
//!
//! Every mutation goes through the store's whole-data patch API; a write
//! rejected here (duplicate VPI) leaves the graph exactly as it was.
//!
//! # Invariants
//! - A non-empty `vpi` is unique across every position of every action
//!   node in the graph; the empty string is exempt.
//! - `delete_position` never renumbers the survivors' priorities.
//! - Entry nodes hold exactly one position at all times (self-healing).

use crate::domain::{
    Node, NodeId, NodeKind, Position, PositionId, PositionPatch, StrikeType,
    DEFAULT_PREMIUM_STRIKE_VALUE,
};
use crate::store::{GraphStore, StoreError};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from registry operations.
///
/// `DuplicateVpi` is a user-correctable validation error; the rest are
/// caller bugs and should be treated as such.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("node {node} is a {kind} node and carries no positions")]
    NotAnActionNode { node: NodeId, kind: NodeKind },

    #[error("position {position} not found on node {node}")]
    PositionNotFound { node: NodeId, position: PositionId },

    #[error("vpi '{vpi}' is already used by another position")]
    DuplicateVpi { vpi: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn action_node<'a, S: GraphStore>(store: &'a S, id: &NodeId) -> Result<&'a Node, RegistryError> {
    let node = store
        .node(id)
        .ok_or_else(|| RegistryError::NodeNotFound(id.clone()))?;
    if !node.kind().is_action() {
        return Err(RegistryError::NotAnActionNode {
            node: id.clone(),
            kind: node.kind(),
        });
    }
    Ok(node)
}

/// Pure query: would `candidate` collide with any other position's vpi?
/// The empty string is always valid.
pub fn validate_vpi_uniqueness<S: GraphStore>(
    store: &S,
    candidate: &str,
    excluding: Option<PositionId>,
) -> bool {
    if candidate.is_empty() {
        return true;
    }
    !store.nodes().iter().any(|node| {
        node.data
            .positions()
            .into_iter()
            .flatten()
            .any(|p| p.vpi == candidate && Some(p.id) != excluding)
    })
}

/// Inline-form predicate for editors.
pub fn is_vpi_duplicate<S: GraphStore>(
    store: &S,
    candidate: &str,
    excluding: Option<PositionId>,
) -> bool {
    !validate_vpi_uniqueness(store, candidate, excluding)
}

/// Derive the next auto-vpi for a node: `"<node>-pos<N>"` with N starting
/// at the running position count + 1, bumped past collisions left behind
/// by deletions.
fn next_auto_vpi<S: GraphStore>(store: &S, node_id: &NodeId, count: usize) -> String {
    let mut n = count + 1;
    loop {
        let vpi = format!("{node_id}-pos{n}");
        if validate_vpi_uniqueness(store, &vpi, None) {
            return vpi;
        }
        n += 1;
    }
}

/// Create a position on an action node with the documented defaults and
/// append it to the node's array.
pub fn create_position<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
) -> Result<Position, RegistryError> {
    let node = action_node(store, node_id)?;
    let count = node.data.positions().map(|p| p.len()).unwrap_or(0);
    let vpi = next_auto_vpi(store, node_id, count);
    let mut data = store
        .node(node_id)
        .expect("node existence checked above")
        .data
        .clone();

    let id = store.next_position_id();
    let position = Position::with_defaults(id, vpi, count as u32 + 1);
    data.positions_mut()
        .expect("action kind checked above")
        .push(position.clone());
    store.patch_node_data(node_id, data)?;
    info!(node = %node_id, position = %position.id, vpi = %position.vpi, "position created");
    Ok(position)
}

/// Merge a patch into one position. A vpi collision rejects the whole
/// write and the node is left untouched.
pub fn update_position<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
    position_id: PositionId,
    patch: &PositionPatch,
) -> Result<Position, RegistryError> {
    let node = action_node(store, node_id)?;
    if !node
        .data
        .positions()
        .into_iter()
        .flatten()
        .any(|p| p.id == position_id)
    {
        return Err(RegistryError::PositionNotFound {
            node: node_id.clone(),
            position: position_id,
        });
    }

    if let Some(vpi) = &patch.vpi {
        if is_vpi_duplicate(store, vpi, Some(position_id)) {
            return Err(RegistryError::DuplicateVpi { vpi: vpi.clone() });
        }
    }

    let mut data = node.data.clone();
    let positions = data.positions_mut().expect("action kind checked above");
    let position = positions
        .iter_mut()
        .find(|p| p.id == position_id)
        .expect("presence checked above");
    patch.apply_to(position);
    let updated = position.clone();
    store.patch_node_data(node_id, data)?;
    debug!(node = %node_id, position = %position_id, "position updated");
    Ok(updated)
}

/// Remove a position by id. Survivors keep their priorities. An entry
/// node emptied by the deletion self-heals back to one position.
pub fn delete_position<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
    position_id: PositionId,
) -> Result<(), RegistryError> {
    let node = action_node(store, node_id)?;
    let kind = node.kind();
    let mut data = node.data.clone();
    let positions = data.positions_mut().expect("action kind checked above");
    let before = positions.len();
    positions.retain(|p| p.id != position_id);
    if positions.len() == before {
        return Err(RegistryError::PositionNotFound {
            node: node_id.clone(),
            position: position_id,
        });
    }
    store.patch_node_data(node_id, data)?;
    info!(node = %node_id, position = %position_id, "position deleted");

    if kind == NodeKind::Entry {
        ensure_entry_position(store, node_id)?;
    }
    Ok(())
}

/// Entry nodes carry exactly one position. Called on node creation and
/// after deletions; a no-op when a position is already present.
pub fn ensure_entry_position<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
) -> Result<Option<Position>, RegistryError> {
    let node = action_node(store, node_id)?;
    if node.kind() != NodeKind::Entry {
        return Ok(None);
    }
    let empty = node.data.positions().is_some_and(|p| p.is_empty());
    if !empty {
        return Ok(None);
    }
    debug!(node = %node_id, "entry node self-healing: recreating its position");
    create_position(store, node_id).map(Some)
}

/// Change a position's option strike selection. Selecting `Premium` for
/// the first time installs the default strike value.
pub fn set_strike_type<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
    position_id: PositionId,
    strike_type: StrikeType,
) -> Result<Position, RegistryError> {
    let node = action_node(store, node_id)?;
    let mut data = node.data.clone();
    let positions = data.positions_mut().expect("action kind checked above");
    let position = positions
        .iter_mut()
        .find(|p| p.id == position_id)
        .ok_or_else(|| RegistryError::PositionNotFound {
            node: node_id.clone(),
            position: position_id,
        })?;

    let details = position
        .option_details
        .get_or_insert_with(crate::domain::OptionDetails::atm);
    details.strike_type = strike_type;
    if strike_type == StrikeType::Premium && details.strike_value.is_none() {
        details.strike_value = Some(DEFAULT_PREMIUM_STRIKE_VALUE);
    }
    let updated = position.clone();
    store.patch_node_data(node_id, data)?;
    Ok(updated)
}
