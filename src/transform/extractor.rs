//! Field references against arbitrary JSON records.
//!
//! Two forms are supported:
//!
//! - `a.b.c` walks nested objects (numeric segments index into arrays).
//! - `field:/regex/` applies `regex` to the string at `field` (itself a dot
//!   path) and yields the first capture group.
//!
//! Missing keys at any depth resolve to `None`; nothing here errors.

use regex::Regex;
use serde_json::Value;
use tracing::warn;

/// Resolve `path` against `record`.
#[must_use]
pub fn resolve(record: &Value, path: &str) -> Option<Value> {
    if let Some((field, pattern)) = split_regex_ref(path) {
        return resolve_regex(record, field, pattern);
    }
    resolve_path(record, path).cloned()
}

/// Resolve `path` and render the value as text.
///
/// Strings are returned verbatim, numbers and booleans via `to_string`,
/// arrays and objects as compact JSON. `null` counts as missing.
#[must_use]
pub fn resolve_text(record: &Value, path: &str) -> Option<String> {
    resolve(record, path).and_then(|value| value_to_text(&value))
}

/// Render a JSON value as template text.
#[must_use]
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Plain dot-path traversal.
fn resolve_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    let mut current = record;
    for segment in path.split('.') {
        current = match current {
            Value::Object(fields) => fields.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Split `field:/regex/` into its parts.
fn split_regex_ref(path: &str) -> Option<(&str, &str)> {
    let (field, rest) = path.split_once(":/")?;
    let pattern = rest.strip_suffix('/')?;
    if field.is_empty() || pattern.is_empty() {
        return None;
    }
    Some((field, pattern))
}

fn resolve_regex(record: &Value, field: &str, pattern: &str) -> Option<Value> {
    let text = resolve_path(record, field)?.as_str()?;
    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => {
            warn!(%pattern, %err, "invalid regex in field reference");
            return None;
        }
    };
    let captured = regex.captures(text)?.get(1)?;
    Some(Value::String(captured.as_str().to_owned()))
}
