//! Strategy document persistence — JSON import/export of `{nodes, edges}`.
//!
//! Round-trip contract: export → import → export reproduces an identical
//! document. Unknown node kinds fail import (the payload union is closed).

use crate::domain::{Edge, Node};
use crate::store::{InMemoryGraphStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current document schema version.
pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("strategy document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported document version {0} (expected {DOCUMENT_VERSION})")]
    UnsupportedVersion(u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The persisted graph state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDocument {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl StrategyDocument {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            exported_at: None,
            nodes,
            edges,
        }
    }

    /// Snapshot a store into a document.
    pub fn from_store(store: &InMemoryGraphStore) -> Self {
        use crate::store::GraphStore;
        Self::new(store.nodes().to_vec(), store.edges().to_vec())
    }

    /// Build a store from the document. Duplicate node ids fail loudly.
    pub fn into_store(self) -> Result<InMemoryGraphStore, PersistError> {
        Ok(InMemoryGraphStore::from_parts(self.nodes, self.edges)?)
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        let doc: StrategyDocument = serde_json::from_str(json)?;
        if doc.version != DOCUMENT_VERSION {
            return Err(PersistError::UnsupportedVersion(doc.version));
        }
        Ok(doc)
    }
}
