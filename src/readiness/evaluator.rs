//! Readiness evaluator for normalized items.
//!
//! Decides whether an item should be acted on now. Gates run in a fixed
//! order and the first failing gate short-circuits with its reason. A gate
//! with no configuration (or no enrichment data to inspect) passes.

use serde_json::{Map, Value};
use tracing::{debug, debug_span};

use crate::models::item::Item;
use crate::models::source::{LabelRules, ReadinessRules};
use crate::transform::extractor;

/// Enrichment key holding the item's comment list.
pub const COMMENTS_KEY: &str = "_comments";
/// Enrichment key holding the provider's mergeability state.
pub const MERGEABLE_KEY: &str = "_mergeable";
/// Enrichment key holding the precomputed attention flag.
pub const ATTENTION_KEY: &str = "_has_attention";

/// Outcome of a readiness evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// Whether every gate passed.
    pub ready: bool,
    /// Why the failing gate rejected the item.
    pub reason: Option<String>,
}

impl Readiness {
    /// A passing result.
    #[must_use]
    pub fn ready() -> Self {
        Self {
            ready: true,
            reason: None,
        }
    }

    /// A failing result with a reason.
    #[must_use]
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self {
            ready: false,
            reason: Some(reason.into()),
        }
    }
}

/// Evaluates readiness gates against an item.
pub struct ReadinessEvaluator;

impl ReadinessEvaluator {
    /// Check `item` against `rules`.
    ///
    /// Evaluation order:
    /// 1. Labels (required / excluded).
    /// 2. Comment activity (bot or author only ⇒ not ready).
    /// 3. Exact field matches.
    /// 4. Merge conflict state.
    /// 5. Attention flag.
    #[must_use]
    pub fn check(item: &Item, rules: Option<&ReadinessRules>) -> Readiness {
        let _span = debug_span!("readiness", item_id = item.id().as_deref().unwrap_or("")).entered();

        let Some(rules) = rules else {
            return Readiness::ready();
        };

        let gates: [&dyn Fn() -> Readiness; 5] = [
            // ── 1. Labels ───────────────────────────────────────
            &|| check_labels(item, rules.labels.as_ref()),
            // ── 2. Comment activity ─────────────────────────────
            &|| check_bot_comments(item, &rules.bot_accounts),
            // ── 3. Field equality ───────────────────────────────
            &|| check_fields(item, &rules.fields),
            // ── 4. Merge conflicts ──────────────────────────────
            &|| check_mergeable(item, rules.require_conflicts),
            // ── 5. Attention ────────────────────────────────────
            &|| check_attention(item, rules.require_attention),
        ];
        for gate in gates {
            let result = gate();
            if !result.ready {
                debug!(reason = result.reason.as_deref().unwrap_or(""), "item not ready");
                return result;
            }
        }
        Readiness::ready()
    }
}

/// Label gate: excluded labels reject, missing required labels reject.
#[must_use]
pub fn check_labels(item: &Item, rules: Option<&LabelRules>) -> Readiness {
    let Some(rules) = rules else {
        return Readiness::ready();
    };
    let labels = item_labels(item);
    let has = |wanted: &str| labels.iter().any(|label| label.eq_ignore_ascii_case(wanted));

    if let Some(excluded) = rules.exclude.iter().find(|label| has(label)) {
        return Readiness::not_ready(format!("has excluded label `{excluded}`"));
    }
    if let Some(missing) = rules.required.iter().find(|label| !has(label)) {
        return Readiness::not_ready(format!("missing required label `{missing}`"));
    }
    Readiness::ready()
}

/// Human-feedback gate over the `_comments` enrichment.
///
/// Passes when no comment list is attached, or when at least one comment
/// comes from a human other than the item's author.
#[must_use]
pub fn check_bot_comments(item: &Item, bot_accounts: &[String]) -> Readiness {
    let Some(comments) = item.get(COMMENTS_KEY).and_then(Value::as_array) else {
        return Readiness::ready();
    };
    if has_human_feedback(item, comments, bot_accounts) {
        Readiness::ready()
    } else {
        Readiness::not_ready("no human feedback: comments are only bot or author activity")
    }
}

/// Field gate: every configured field must equal the expected value.
#[must_use]
pub fn check_fields(item: &Item, fields: &Map<String, Value>) -> Readiness {
    for (field, expected) in fields {
        match extractor::resolve(item.as_value(), field) {
            Some(actual) if &actual == expected => {}
            Some(actual) => {
                return Readiness::not_ready(format!(
                    "field `{field}` is {actual}, expected {expected}"
                ));
            }
            None => {
                return Readiness::not_ready(format!("field `{field}` is missing"));
            }
        }
    }
    Readiness::ready()
}

/// Mergeability gate: with `require_conflicts`, only conflicting items pass.
#[must_use]
pub fn check_mergeable(item: &Item, require_conflicts: bool) -> Readiness {
    if !require_conflicts {
        return Readiness::ready();
    }
    let Some(state) = item.get(MERGEABLE_KEY).and_then(Value::as_str) else {
        return Readiness::ready();
    };
    if is_conflicting(state) {
        Readiness::ready()
    } else {
        Readiness::not_ready(format!("no merge conflicts (mergeable state `{state}`)"))
    }
}

/// Attention gate: with `require_attention`, only flagged items pass.
#[must_use]
pub fn check_attention(item: &Item, require_attention: bool) -> Readiness {
    if !require_attention {
        return Readiness::ready();
    }
    if item.get(ATTENTION_KEY).and_then(Value::as_bool) == Some(true) {
        Readiness::ready()
    } else {
        Readiness::not_ready("item does not need attention")
    }
}

/// Whether a provider mergeability string denotes a conflict.
#[must_use]
pub fn is_conflicting(state: &str) -> bool {
    matches!(
        state.trim().to_ascii_lowercase().as_str(),
        "conflicting" | "dirty"
    )
}

/// Whether any comment is from a third-party human.
#[must_use]
pub fn has_human_feedback(item: &Item, comments: &[Value], bot_accounts: &[String]) -> bool {
    let author = login_of(item.as_value());
    comments.iter().any(|comment| {
        if is_bot(comment, bot_accounts) {
            return false;
        }
        match (login_of(comment), author.as_deref()) {
            (Some(login), Some(author)) => !login.eq_ignore_ascii_case(author),
            (Some(_), None) => true,
            (None, _) => false,
        }
    })
}

/// Where an item's or comment's author handle lives, in preference order.
/// Providers without logins identify people by `name` or `displayName`.
const AUTHOR_PATHS: &[&str] = &[
    "user.login",
    "author.login",
    "user",
    "author",
    "user.name",
    "author.name",
    "user.displayName",
    "author.displayName",
    "displayName",
];

fn login_of(record: &Value) -> Option<String> {
    AUTHOR_PATHS
        .iter()
        .filter_map(|path| extractor::resolve(record, path))
        .find_map(|value| value.as_str().map(ToOwned::to_owned))
}

fn is_bot(comment: &Value, bot_accounts: &[String]) -> bool {
    let flagged = ["user.type", "author.type"]
        .iter()
        .filter_map(|path| extractor::resolve(comment, path))
        .any(|kind| kind.as_str() == Some("Bot"))
        || ["author.is_bot", "user.is_bot"]
            .iter()
            .filter_map(|path| extractor::resolve(comment, path))
            .any(|flag| flag.as_bool() == Some(true));
    if flagged {
        return true;
    }
    login_of(comment).is_some_and(|login| {
        login.ends_with("[bot]")
            || bot_accounts
                .iter()
                .any(|account| account.eq_ignore_ascii_case(&login))
    })
}

/// Labels as plain strings; accepts strings, `{name}` objects, and `{nodes: [...]}`.
fn item_labels(item: &Item) -> Vec<String> {
    let entries = match item.get("labels") {
        Some(Value::Array(entries)) => entries.as_slice(),
        Some(Value::Object(wrapper)) => match wrapper.get("nodes") {
            Some(Value::Array(entries)) => entries.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(name) => Some(name.clone()),
            Value::Object(fields) => fields
                .get("name")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
            _ => None,
        })
        .collect()
}
