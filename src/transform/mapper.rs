//! Field mapping and identifier assignment.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::extractor;
use super::template::{self, Unresolved};
use crate::models::item::Item;
use crate::models::source::SourceConfig;

/// Apply a mapping table to `record`.
///
/// The result keeps every original field and adds each mapped destination
/// key, shadowing originals of the same name. Mappings that resolve to
/// nothing are skipped. Without a table the record is returned unchanged.
#[must_use]
pub fn apply_mappings(record: Value, mappings: Option<&BTreeMap<String, String>>) -> Value {
    let Some(mappings) = mappings else {
        return record;
    };
    let Value::Object(original) = &record else {
        return record;
    };

    let mut mapped = original.clone();
    for (dest, source_ref) in mappings {
        if let Some(value) = extractor::resolve(&record, source_ref) {
            mapped.insert(dest.clone(), value);
        }
    }
    Value::Object(mapped)
}

/// Substitute `{path}` placeholders in an identifier template.
///
/// Placeholders that do not resolve stay verbatim.
#[must_use]
pub fn expand_item_id(template: &str, record: &Value) -> String {
    template::expand(template, record, Unresolved::Keep)
}

/// Identifier computed for a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedId {
    /// The identifier.
    pub id: String,
    /// False when a template placeholder failed to resolve.
    pub complete: bool,
}

/// Compute an item's identifier.
///
/// With a template the template wins. Otherwise an existing `id` field is
/// reused verbatim, and failing that a content hash is synthesised. The
/// hash is stable for identical records but not globally unique; sources
/// polled repeatedly should configure an explicit template.
#[must_use]
pub fn assign_id(record: &Value, template: Option<&str>) -> AssignedId {
    if let Some(template) = template {
        let expansion = template::expand_checked(template, record, Unresolved::Keep);
        return AssignedId {
            complete: expansion.is_complete(),
            id: expansion.text,
        };
    }
    let id = match record.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => fallback_id(record),
    };
    AssignedId { id, complete: true }
}

fn fallback_id(record: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.to_string().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("item-{}", &digest[..16])
}

/// A record after mapping and identifier assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    /// The item, with `id` stamped.
    pub item: Item,
    /// False when the identifier template left a placeholder unresolved.
    pub id_complete: bool,
}

/// Map a raw record and stamp its identifier into `id`.
///
/// Returns `None` for records that are not JSON objects.
#[must_use]
pub fn transform_record(record: Value, source: &SourceConfig) -> Option<Transformed> {
    let mapped = apply_mappings(record, source.mappings.as_ref());
    let assigned = assign_id(&mapped, source.id_template.as_deref());
    let mut item = Item::from_value(mapped)?;
    item.set("id", Value::String(assigned.id));
    Some(Transformed {
        item,
        id_complete: assigned.complete,
    })
}
