//! Readiness gates and attention enrichment.

use agent_relay::models::item::Item;
use agent_relay::models::source::{LabelRules, ReadinessRules};
use agent_relay::readiness::attention::annotate_attention;
use agent_relay::readiness::ReadinessEvaluator;
use serde_json::{json, Map, Value};

fn item(value: Value) -> Item {
    Item::from_value(value).expect("object item")
}

fn label_rules(required: &[&str], exclude: &[&str]) -> ReadinessRules {
    ReadinessRules {
        labels: Some(LabelRules {
            required: required.iter().map(|s| (*s).to_owned()).collect(),
            exclude: exclude.iter().map(|s| (*s).to_owned()).collect(),
        }),
        ..ReadinessRules::default()
    }
}

#[test]
fn no_rules_means_ready() {
    let result = ReadinessEvaluator::check(&item(json!({ "id": "x" })), None);
    assert!(result.ready);
    assert!(result.reason.is_none());
}

#[test]
fn excluded_label_blocks_with_reason() {
    let item = item(json!({ "id": "1", "labels": ["bug", "wip"] }));
    let result = ReadinessEvaluator::check(&item, Some(&label_rules(&[], &["wip"])));
    assert!(!result.ready);
    assert!(result.reason.expect("reason").contains("wip"));
}

#[test]
fn required_label_accepts_name_objects() {
    let rules = label_rules(&["agent"], &[]);
    let labelled = item(json!({ "labels": [{ "name": "Agent" }] }));
    let unlabelled = item(json!({ "labels": [{ "name": "bug" }] }));

    assert!(ReadinessEvaluator::check(&labelled, Some(&rules)).ready);
    let result = ReadinessEvaluator::check(&unlabelled, Some(&rules));
    assert!(!result.ready);
    assert!(result.reason.expect("reason").contains("agent"));
}

#[test]
fn only_bot_comments_is_not_ready() {
    let item = item(json!({
        "user": { "login": "alice" },
        "_comments": [
            { "user": { "login": "ci-helper[bot]", "type": "Bot" } },
            { "user": { "login": "renovate[bot]" } }
        ]
    }));
    let result = ReadinessEvaluator::check(&item, Some(&ReadinessRules::default()));
    assert!(!result.ready);
    assert!(result.reason.expect("reason").contains("bot"));
}

#[test]
fn author_comments_do_not_count_as_feedback() {
    let item = item(json!({
        "user": { "login": "alice" },
        "_comments": [{ "user": { "login": "alice" } }]
    }));
    assert!(!ReadinessEvaluator::check(&item, Some(&ReadinessRules::default())).ready);
}

#[test]
fn third_party_human_comment_is_ready() {
    let item = item(json!({
        "user": { "login": "alice" },
        "_comments": [
            { "user": { "login": "dependabot[bot]" } },
            { "user": { "login": "bob" } }
        ]
    }));
    assert!(ReadinessEvaluator::check(&item, Some(&ReadinessRules::default())).ready);
}

#[test]
fn comments_identified_by_display_name_count_as_human() {
    let reviewed = item(json!({
        "creator": { "name": "Alice" },
        "_comments": [{ "user": { "name": "Bob", "displayName": "bob" } }]
    }));
    assert!(ReadinessEvaluator::check(&reviewed, Some(&ReadinessRules::default())).ready);

    let own = item(json!({
        "user": { "displayName": "alice" },
        "_comments": [{ "user": { "displayName": "Alice" } }]
    }));
    assert!(!ReadinessEvaluator::check(&own, Some(&ReadinessRules::default())).ready);
}

#[test]
fn configured_bot_accounts_are_ignored() {
    let rules = ReadinessRules {
        bot_accounts: vec!["release-robot".into()],
        ..ReadinessRules::default()
    };
    let item = item(json!({
        "author": { "login": "alice" },
        "_comments": [{ "author": { "login": "release-robot" } }]
    }));
    assert!(!ReadinessEvaluator::check(&item, Some(&rules)).ready);
}

#[test]
fn field_gate_requires_exact_match() {
    let mut fields = Map::new();
    fields.insert("state".into(), json!("open"));
    let rules = ReadinessRules {
        fields,
        ..ReadinessRules::default()
    };

    assert!(ReadinessEvaluator::check(&item(json!({ "state": "open" })), Some(&rules)).ready);
    assert!(!ReadinessEvaluator::check(&item(json!({ "state": "closed" })), Some(&rules)).ready);
    assert!(!ReadinessEvaluator::check(&item(json!({})), Some(&rules)).ready);
}

#[test]
fn mergeable_gate_only_passes_conflicts() {
    let rules = ReadinessRules {
        require_conflicts: true,
        ..ReadinessRules::default()
    };
    assert!(ReadinessEvaluator::check(&item(json!({ "_mergeable": "CONFLICTING" })), Some(&rules)).ready);
    assert!(!ReadinessEvaluator::check(&item(json!({ "_mergeable": "MERGEABLE" })), Some(&rules)).ready);
    assert!(!ReadinessEvaluator::check(&item(json!({ "_mergeable": "UNKNOWN" })), Some(&rules)).ready);
    assert!(
        ReadinessEvaluator::check(&item(json!({})), Some(&rules)).ready,
        "gate is skipped without enrichment"
    );
}

#[test]
fn attention_gate_requires_flag() {
    let rules = ReadinessRules {
        require_attention: true,
        ..ReadinessRules::default()
    };
    assert!(ReadinessEvaluator::check(&item(json!({ "_has_attention": true })), Some(&rules)).ready);
    assert!(!ReadinessEvaluator::check(&item(json!({ "_has_attention": false })), Some(&rules)).ready);
    assert!(!ReadinessEvaluator::check(&item(json!({})), Some(&rules)).ready);
}

#[test]
fn labels_are_checked_before_fields() {
    let mut rules = label_rules(&[], &["wip"]);
    rules.fields.insert("state".into(), json!("open"));
    let item = item(json!({ "labels": ["wip"], "state": "closed" }));

    let reason = ReadinessEvaluator::check(&item, Some(&rules))
        .reason
        .expect("reason");
    assert!(reason.contains("wip"), "first failing gate wins: {reason}");
}

#[test]
fn attention_is_derived_from_conflicts_or_feedback() {
    let mut conflicted = item(json!({ "_mergeable": "dirty" }));
    assert!(annotate_attention(&mut conflicted, &[]));
    assert_eq!(conflicted.get("_has_attention"), Some(&json!(true)));

    let mut quiet = item(json!({ "user": { "login": "a" }, "_comments": [] }));
    assert!(!annotate_attention(&mut quiet, &[]));
    assert_eq!(quiet.get("_has_attention"), Some(&json!(false)));
}

#[test]
fn precomputed_attention_flag_is_kept() {
    let mut flagged = item(json!({ "_has_attention": true }));
    assert!(annotate_attention(&mut flagged, &[]));
}
