//! Built-in source presets.
//!
//! A preset fills in the fetch and transform fields for a well-known
//! provider. Anything the source sets explicitly wins; mapping tables are
//! merged key by key.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::models::source::{CommandSpec, SourceConfig, ToolDescriptor};
use crate::{AppError, Result};

/// Names accepted in a source's `preset` field.
pub const PRESET_NAMES: [&str; 3] = ["github-issues", "github-prs", "linear-issues"];

struct Preset {
    tool: ToolDescriptor,
    response_key: Option<&'static str>,
    id_template: &'static str,
    repo: Option<&'static str>,
    mappings: &'static [(&'static str, &'static str)],
}

fn gh_search(kind: &str, filter: &str) -> ToolDescriptor {
    ToolDescriptor {
        command: Some(CommandSpec::Argv(
            [
                "gh",
                "search",
                kind,
                filter,
                "--state=open",
                "--limit={limit}",
                "--json=number,title,body,url,labels,state,updatedAt,repository,author",
            ]
            .map(str::to_owned)
            .to_vec(),
        )),
        args: args(json!({ "limit": 100 })),
        ..ToolDescriptor::default()
    }
}

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn lookup(name: &str) -> Option<Preset> {
    let github_mappings: &'static [(&str, &str)] = &[
        ("updated_at", "updatedAt"),
        ("repo_full_name", "repository.nameWithOwner"),
    ];
    match name {
        "github-issues" => Some(Preset {
            tool: gh_search("issues", "--assignee=@me"),
            response_key: None,
            id_template: "github:{repository.nameWithOwner}#{number}",
            repo: Some("{repository.nameWithOwner}"),
            mappings: github_mappings,
        }),
        "github-prs" => Some(Preset {
            tool: gh_search("prs", "--review-requested=@me"),
            response_key: None,
            id_template: "github:{repository.nameWithOwner}#{number}",
            repo: Some("{repository.nameWithOwner}"),
            mappings: github_mappings,
        }),
        "linear-issues" => Some(Preset {
            tool: ToolDescriptor {
                mcp: Some("linear".into()),
                name: Some("list_issues".into()),
                args: args(json!({ "assignee": "me" })),
                ..ToolDescriptor::default()
            },
            response_key: Some("issues"),
            id_template: "linear:{identifier}",
            repo: None,
            mappings: &[("updated_at", "updatedAt"), ("body", "description")],
        }),
        _ => None,
    }
}

/// Fill unset fields of `source` from its preset, if it names one.
///
/// # Errors
///
/// Returns `AppError::Config` if the preset name is unknown.
pub fn apply_preset(mut source: SourceConfig) -> Result<SourceConfig> {
    let Some(name) = source.preset.as_deref() else {
        return Ok(source);
    };
    let preset = lookup(name).ok_or_else(|| {
        AppError::Config(format!(
            "source `{}`: unknown preset `{name}` (expected one of {})",
            source.name,
            PRESET_NAMES.join(", ")
        ))
    })?;

    if source.tool.is_none() {
        source.tool = Some(preset.tool);
    }
    if source.response_key.is_none() {
        source.response_key = preset.response_key.map(str::to_owned);
    }
    if source.id_template.is_none() {
        source.id_template = Some(preset.id_template.to_owned());
    }
    if source.repo.is_none() {
        source.repo = preset.repo.map(str::to_owned);
    }

    let mut mappings: BTreeMap<String, String> = preset
        .mappings
        .iter()
        .map(|(dest, path)| ((*dest).to_owned(), (*path).to_owned()))
        .collect();
    if let Some(explicit) = source.mappings.take() {
        mappings.extend(explicit);
    }
    source.mappings = (!mappings.is_empty()).then_some(mappings);

    Ok(source)
}
