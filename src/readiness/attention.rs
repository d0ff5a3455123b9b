//! Attention enrichment.
//!
//! Sources that gate on `require_attention` usually get `_has_attention`
//! from their fetch tool. When the tool does not provide it, the flag is
//! derived here from the conflict and human-feedback signals.

use serde_json::Value;

use super::evaluator::{
    has_human_feedback, is_conflicting, ATTENTION_KEY, COMMENTS_KEY, MERGEABLE_KEY,
};
use crate::models::item::Item;

/// Set `_has_attention` unless the item already carries a boolean flag.
///
/// Returns the flag now on the item.
pub fn annotate_attention(item: &mut Item, bot_accounts: &[String]) -> bool {
    if let Some(flag) = item.get(ATTENTION_KEY).and_then(Value::as_bool) {
        return flag;
    }
    let conflicting = item
        .get(MERGEABLE_KEY)
        .and_then(Value::as_str)
        .is_some_and(is_conflicting);
    let feedback = item
        .get(COMMENTS_KEY)
        .and_then(Value::as_array)
        .is_some_and(|comments| has_human_feedback(item, comments, bot_accounts));
    let flag = conflicting || feedback;
    item.set(ATTENTION_KEY, Value::Bool(flag));
    flag
}
