//! Indicator catalogue — the lookup table owned by the start node.
//!
//! The catalogue maps an indicator key (e.g. `"EMA_1"`) to an opaque
//! parameter schema. The core never interprets the schema beyond pulling a
//! display period for rendering; the technical-indicator parameter
//! catalogue itself is an external collaborator.
//!
//! Uses `BTreeMap` for deterministic key ordering during serialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque parameter schema of one indicator.
pub type IndicatorSchema = BTreeMap<String, serde_json::Value>;

/// Ordered map of indicator key → parameter schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorCatalogue {
    pub entries: BTreeMap<String, IndicatorSchema>,
}

impl IndicatorCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, schema: IndicatorSchema) {
        self.entries.insert(key.into(), schema);
    }

    pub fn remove(&mut self, key: &str) -> Option<IndicatorSchema> {
        self.entries.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Display name for rendering: the schema's `"name"` value when
    /// present, else the key itself.
    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.entries
            .get(key)
            .and_then(|schema| schema.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or(key)
    }
}
