//! Post-execution risk engine — feature toggles and parameter edits on
//! exit nodes.
//!
//! Each feature (stop-loss, trailing-stop, take-profit) is an independent
//! disabled/enabled state machine with one cross-feature rule: stop-loss
//! and trailing-stop are mutually exclusive. Enabling one forces the other
//! off before the new feature turns on, in the same write.

use crate::domain::{
    FeatureConfig, FeaturePatch, NodeData, NodeId, NodeKind, ReEntryConfig, RiskFeature,
};
use crate::store::{GraphStore, StoreError};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from risk-engine operations. All of them indicate caller bugs.
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("node {node} is a {kind} node; post-execution config lives on exit nodes")]
    NotAnExitNode { node: NodeId, kind: NodeKind },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a re-entry toggle, telling the caller whether the member
/// just joined its group (and must adopt the group's limit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReEntryToggle {
    /// First enable: the default config was installed; the synchronizer
    /// should treat this as a group join.
    Joined,
    /// Re-enable of an existing config; group/limits preserved.
    Enabled,
    Disabled,
}

fn exit_data<S: GraphStore>(
    store: &S,
    node_id: &NodeId,
) -> Result<crate::domain::ExitData, RiskError> {
    let node = store
        .node(node_id)
        .ok_or_else(|| RiskError::NodeNotFound(node_id.clone()))?;
    match &node.data {
        NodeData::Exit(data) => Ok(data.clone()),
        _ => Err(RiskError::NotAnExitNode {
            node: node_id.clone(),
            kind: node.kind(),
        }),
    }
}

fn write_back<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
    data: crate::domain::ExitData,
) -> Result<(), RiskError> {
    store.patch_node_data(node_id, NodeData::Exit(data))?;
    Ok(())
}

/// Enable or disable a feature. Enabling stop-loss forces trailing-stop
/// off first, and vice versa; take-profit has no exclusivity side effect.
pub fn toggle_feature<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
    feature: RiskFeature,
    enabled: bool,
) -> Result<(), RiskError> {
    let mut data = exit_data(store, node_id)?;
    if enabled {
        match feature {
            RiskFeature::StopLoss if data.post_execution.trailing_stop.enabled => {
                info!(node = %node_id, "enabling stop-loss disables trailing-stop");
                data.post_execution.trailing_stop.enabled = false;
            }
            RiskFeature::TrailingStop if data.post_execution.stop_loss.enabled => {
                info!(node = %node_id, "enabling trailing-stop disables stop-loss");
                data.post_execution.stop_loss.enabled = false;
            }
            _ => {}
        }
    }
    data.post_execution.feature_mut(feature).enabled = enabled;
    write_back(store, node_id, data)
}

pub fn toggle_stop_loss<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
    enabled: bool,
) -> Result<(), RiskError> {
    toggle_feature(store, node_id, RiskFeature::StopLoss, enabled)
}

pub fn toggle_trailing_stop<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
    enabled: bool,
) -> Result<(), RiskError> {
    toggle_feature(store, node_id, RiskFeature::TrailingStop, enabled)
}

pub fn toggle_take_profit<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
    enabled: bool,
) -> Result<(), RiskError> {
    toggle_feature(store, node_id, RiskFeature::TakeProfit, enabled)
}

/// Merge a patch into one feature's config; other features are untouched.
/// Fields that don't match the current trigger type are stored as-is.
pub fn update_feature<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
    feature: RiskFeature,
    patch: &FeaturePatch,
) -> Result<FeatureConfig, RiskError> {
    let mut data = exit_data(store, node_id)?;
    let config = data.post_execution.feature_mut(feature);
    patch.apply_to(config);
    let updated = config.clone();
    write_back(store, node_id, data)?;
    debug!(node = %node_id, %feature, "feature config updated");
    Ok(updated)
}

/// Enable or disable a feature's re-entry. The first enable installs
/// `{enabled: true, group_number: 1, max_re_entries: 1}` and reports a
/// group join; later toggles only flip `enabled`, preserving group and
/// limit.
pub fn toggle_feature_re_entry<S: GraphStore>(
    store: &mut S,
    node_id: &NodeId,
    feature: RiskFeature,
    enabled: bool,
) -> Result<ReEntryToggle, RiskError> {
    let mut data = exit_data(store, node_id)?;
    let config = data.post_execution.feature_mut(feature);
    let outcome = match (&mut config.re_entry, enabled) {
        (slot @ None, true) => {
            *slot = Some(ReEntryConfig::default());
            ReEntryToggle::Joined
        }
        (Some(re_entry), true) => {
            let fresh_join = !re_entry.enabled;
            re_entry.enabled = true;
            if fresh_join {
                ReEntryToggle::Joined
            } else {
                ReEntryToggle::Enabled
            }
        }
        (Some(re_entry), false) => {
            re_entry.enabled = false;
            ReEntryToggle::Disabled
        }
        (None, false) => ReEntryToggle::Disabled,
    };
    write_back(store, node_id, data)?;
    info!(node = %node_id, %feature, ?outcome, "re-entry toggled");
    Ok(outcome)
}
