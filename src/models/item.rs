//! Normalized work item produced per poll cycle.

use serde_json::{Map, Value};

use super::timestamp;

/// One external work unit (issue, PR, task, meeting) after transformation.
///
/// Wraps the provider record as an opaque JSON object. Items are never
/// persisted; the ledger only keeps a fingerprint (`state`, `updated_at`).
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    record: Value,
}

impl Item {
    /// Wrap a JSON value. Returns `None` unless the value is an object.
    #[must_use]
    pub fn from_value(record: Value) -> Option<Self> {
        record.is_object().then_some(Self { record })
    }

    /// Build an item from an already-split field map.
    #[must_use]
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            record: Value::Object(fields),
        }
    }

    /// Borrow the underlying record for field extraction.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.record
    }

    /// Consume the item, returning the underlying record.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.record
    }

    /// Top-level field lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.record.get(key)
    }

    /// Set (or replace) a top-level field.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        if let Value::Object(fields) = &mut self.record {
            fields.insert(key.into(), value);
        }
    }

    /// Normalized identifier. Numeric ids are rendered as strings.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        match self.record.get("id")? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    /// Lifecycle label from `state` or `status`.
    ///
    /// Object-valued states (`{"name": "Todo"}`) resolve to their `name`.
    #[must_use]
    pub fn state(&self) -> Option<String> {
        ["state", "status"]
            .iter()
            .filter_map(|key| self.record.get(*key))
            .find_map(|value| match value {
                Value::String(label) if !label.is_empty() => Some(label.clone()),
                Value::Object(fields) => fields
                    .get("name")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned),
                _ => None,
            })
    }

    /// Last-update timestamp from `updated_at` or `updatedAt`, normalized
    /// to RFC 3339 UTC.
    ///
    /// Epoch numbers, naive date-times and bare dates are accepted;
    /// unparseable values count as absent.
    #[must_use]
    pub fn updated_at(&self) -> Option<String> {
        ["updated_at", "updatedAt"]
            .iter()
            .filter_map(|key| self.record.get(*key))
            .find_map(timestamp::parse_value)
            .map(timestamp::to_canonical)
    }
}
