//! Edges — directed execution-flow connections between nodes.
//!
//! The core stores and round-trips edges but never evaluates them; flow
//! traversal belongs to the execution engine.

use super::ids::NodeId;
use serde::{Deserialize, Serialize};

/// A directed `(source, target)` connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}
