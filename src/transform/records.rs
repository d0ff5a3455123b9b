//! Raw tool output to record list.

use serde_json::Value;
use tracing::debug;

/// Parse tool output into raw records.
///
/// Accepts a JSON array, an object whose `response_key` holds the array,
/// or a single object (wrapped as one record). Invalid JSON and scalar
/// payloads yield an empty list.
#[must_use]
pub fn parse_records(raw: &str, response_key: Option<&str>) -> Vec<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            debug!(%err, "tool output is not valid JSON");
            return Vec::new();
        }
    };

    match parsed {
        Value::Array(records) => records,
        Value::Object(mut fields) => {
            if let Some(key) = response_key {
                match fields.remove(key) {
                    Some(Value::Array(records)) => return records,
                    Some(other) => {
                        fields.insert(key.to_owned(), other);
                    }
                    None => {}
                }
            }
            vec![Value::Object(fields)]
        }
        _ => Vec::new(),
    }
}
