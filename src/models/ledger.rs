//! Processed-item ledger document and record model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry in the processed-item ledger, keyed by item identifier.
///
/// Unknown fields written by other tools or newer versions are kept in
/// `extra` and written back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRecord {
    /// When the item was last dispatched.
    pub processed_at: DateTime<Utc>,
    /// Name of the source that produced the item.
    pub source: String,
    /// Lifecycle label seen at dispatch time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_state: Option<String>,
    /// Provider update timestamp seen at dispatch time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_updated_at: Option<String>,
    /// Fields this version does not know about.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fingerprint supplied when marking an item processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedMeta {
    /// Name of the source that produced the item.
    pub source: String,
    /// Current lifecycle label, if the item exposes one.
    pub item_state: Option<String>,
    /// Current update timestamp, if the item exposes one.
    pub item_updated_at: Option<String>,
}

impl ProcessedMeta {
    /// Metadata carrying only the source name.
    #[must_use]
    pub fn for_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }
}

/// On-disk ledger document: `{ "processed": { "<id>": { ... } } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LedgerDocument {
    /// Records keyed by item identifier.
    #[serde(default)]
    pub processed: BTreeMap<String, ProcessedRecord>,
    /// Top-level fields this version does not know about.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
