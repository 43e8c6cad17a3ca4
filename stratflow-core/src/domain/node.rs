//! Nodes — the typed vertices of the strategy graph.
//!
//! `NodeData` is a closed tagged union keyed by node kind; every
//! consumption site matches exhaustively, so adding a kind breaks the
//! build everywhere it must be handled. No runtime shape-guessing.

use super::condition::ConditionGroup;
use super::ids::NodeId;
use super::indicator::IndicatorCatalogue;
use super::position::Position;
use super::risk::{PostExecutionConfig, ReEntryConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node kind discriminant, derived from the `NodeData` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Start,
    Signal,
    EntrySignal,
    ExitSignal,
    Entry,
    Exit,
    Alert,
    Modify,
    Retry,
    End,
    ForceEnd,
}

impl NodeKind {
    /// Action kinds carry a positions array and participate in the VPI
    /// uniqueness scan.
    pub fn is_action(self) -> bool {
        matches!(
            self,
            NodeKind::Entry | NodeKind::Exit | NodeKind::Alert | NodeKind::Modify
        )
    }

    /// Signal-bearing kinds carry a condition tree.
    pub fn is_signal(self) -> bool {
        matches!(
            self,
            NodeKind::Signal | NodeKind::EntrySignal | NodeKind::ExitSignal
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Start => "start",
            NodeKind::Signal => "signal",
            NodeKind::EntrySignal => "entrySignal",
            NodeKind::ExitSignal => "exitSignal",
            NodeKind::Entry => "entry",
            NodeKind::Exit => "exit",
            NodeKind::Alert => "alert",
            NodeKind::Modify => "modify",
            NodeKind::Retry => "retry",
            NodeKind::End => "end",
            NodeKind::ForceEnd => "forceEnd",
        };
        write!(f, "{s}")
    }
}

/// Signal node payload: a root condition group (always present, possibly
/// empty).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalData {
    pub root: ConditionGroup,
}

/// Entry/alert payload: the node's positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionData {
    pub positions: Vec<Position>,
}

/// Exit payload: positions plus post-execution risk configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitData {
    pub positions: Vec<Position>,
    #[serde(default)]
    pub post_execution: PostExecutionConfig,
}

/// Modify payload: the VPI of the order being modified plus the
/// replacement orders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifyData {
    pub target_vpi: String,
    pub positions: Vec<Position>,
}

/// Retry payload: a direct re-entry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryData {
    pub re_entry: ReEntryConfig,
}

/// Start payload: owns the indicator catalogue the condition trees
/// reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartData {
    #[serde(default)]
    pub indicators: IndicatorCatalogue,
}

/// Kind-specific node payload. Closed union: unknown kinds fail
/// deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeData {
    Start(StartData),
    Signal(SignalData),
    EntrySignal(SignalData),
    ExitSignal(SignalData),
    Entry(ActionData),
    Exit(ExitData),
    Alert(ActionData),
    Modify(ModifyData),
    Retry(RetryData),
    End,
    ForceEnd,
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Start(_) => NodeKind::Start,
            NodeData::Signal(_) => NodeKind::Signal,
            NodeData::EntrySignal(_) => NodeKind::EntrySignal,
            NodeData::ExitSignal(_) => NodeKind::ExitSignal,
            NodeData::Entry(_) => NodeKind::Entry,
            NodeData::Exit(_) => NodeKind::Exit,
            NodeData::Alert(_) => NodeKind::Alert,
            NodeData::Modify(_) => NodeKind::Modify,
            NodeData::Retry(_) => NodeKind::Retry,
            NodeData::End => NodeKind::End,
            NodeData::ForceEnd => NodeKind::ForceEnd,
        }
    }

    /// The node's positions, for action kinds.
    pub fn positions(&self) -> Option<&[Position]> {
        match self {
            NodeData::Entry(d) | NodeData::Alert(d) => Some(&d.positions),
            NodeData::Exit(d) => Some(&d.positions),
            NodeData::Modify(d) => Some(&d.positions),
            _ => None,
        }
    }

    /// Mutable positions, for action kinds.
    pub fn positions_mut(&mut self) -> Option<&mut Vec<Position>> {
        match self {
            NodeData::Entry(d) | NodeData::Alert(d) => Some(&mut d.positions),
            NodeData::Exit(d) => Some(&mut d.positions),
            NodeData::Modify(d) => Some(&mut d.positions),
            _ => None,
        }
    }

    /// The node's condition tree, for signal-bearing kinds.
    pub fn condition_root(&self) -> Option<&ConditionGroup> {
        match self {
            NodeData::Signal(d) | NodeData::EntrySignal(d) | NodeData::ExitSignal(d) => {
                Some(&d.root)
            }
            _ => None,
        }
    }
}

/// A vertex of the strategy graph. Owned by the graph store; mutated only
/// through whole-data replacement via `patch_node_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// User-facing name shown on the canvas; the core carries it for
    /// usage reports.
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub data: NodeData,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>, data: NodeData) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::ConditionGroup;

    #[test]
    fn kind_is_derived_from_variant() {
        let node = Node::new("n1", "Exit A", NodeData::Exit(ExitData::default()));
        assert_eq!(node.kind(), NodeKind::Exit);
        assert!(node.kind().is_action());
        assert!(!node.kind().is_signal());
    }

    #[test]
    fn node_serialization_tags_by_kind() {
        let node = Node::new(
            "n2",
            "RSI gate",
            NodeData::Signal(SignalData {
                root: ConditionGroup::empty_root("root"),
            }),
        );
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "signal");
        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(node, back);
    }

    #[test]
    fn unknown_kind_fails_deserialization() {
        let json = r#"{"id":"n3","label":"","kind":"teleport"}"#;
        assert!(serde_json::from_str::<Node>(json).is_err());
    }

    #[test]
    fn plain_kinds_have_no_payload() {
        let node = Node::new("n4", "", NodeData::End);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "end");
        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), NodeKind::End);
    }
}
