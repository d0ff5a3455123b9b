//! Source configuration: where items come from and how they are shaped.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::action::ActionOverrides;
use crate::{AppError, Result};

/// Command part of a tool descriptor: an argv list or a shell string.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CommandSpec {
    /// Executed directly, first element is the program.
    Argv(Vec<String>),
    /// Executed through `sh -c`.
    Shell(String),
}

/// How to fetch raw records for a source.
///
/// Exactly one of `mcp` (with `name`) or `command` must be set.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ToolDescriptor {
    /// MCP server name.
    #[serde(default)]
    pub mcp: Option<String>,
    /// MCP tool name on that server.
    #[serde(default)]
    pub name: Option<String>,
    /// Local command producing the records on stdout.
    #[serde(default)]
    pub command: Option<CommandSpec>,
    /// Arguments: MCP call arguments, or `{key}` substitutions for commands.
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Validated view of a [`ToolDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind<'a> {
    /// Call `tool` on MCP server `server`.
    Mcp {
        /// MCP server name.
        server: &'a str,
        /// Tool name.
        tool: &'a str,
    },
    /// Run a local command.
    Command(&'a CommandSpec),
}

impl ToolDescriptor {
    /// Classify the descriptor.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the descriptor names neither an MCP
    /// tool nor a command, names both, or has an empty command.
    pub fn kind(&self) -> Result<ToolKind<'_>> {
        match (&self.mcp, &self.name, &self.command) {
            (Some(_), _, Some(_)) => Err(AppError::Config(
                "tool descriptor sets both `mcp` and `command`".into(),
            )),
            (Some(server), Some(tool), None) => Ok(ToolKind::Mcp { server, tool }),
            (Some(server), None, None) => Err(AppError::Config(format!(
                "mcp tool descriptor for server `{server}` is missing `name`"
            ))),
            (None, _, Some(command)) => {
                let empty = match command {
                    CommandSpec::Argv(argv) => argv.is_empty(),
                    CommandSpec::Shell(line) => line.trim().is_empty(),
                };
                if empty {
                    return Err(AppError::Config("tool command is empty".into()));
                }
                Ok(ToolKind::Command(command))
            }
            (None, _, None) => Err(AppError::Config(
                "unknown tool descriptor: expected `mcp` + `name` or `command`".into(),
            )),
        }
    }
}

/// Label constraints for the readiness label gate.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LabelRules {
    /// Every one of these labels must be present.
    #[serde(default)]
    pub required: Vec<String>,
    /// None of these labels may be present.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Readiness gates configured for a source.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ReadinessRules {
    /// Label gate.
    #[serde(default)]
    pub labels: Option<LabelRules>,
    /// Extra account names treated as bots by the human-feedback gate.
    #[serde(default)]
    pub bot_accounts: Vec<String>,
    /// Exact field matches required on the item.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Only act on items whose `_mergeable` reports a conflict.
    #[serde(default)]
    pub require_conflicts: bool,
    /// Only act on items flagged `_has_attention`.
    #[serde(default)]
    pub require_attention: bool,
}

fn default_enabled() -> bool {
    true
}

/// A configured origin of items plus its fetch, transform, and action rules.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    /// Unique source name; also the ledger's `source` tag.
    pub name: String,
    /// Built-in preset supplying defaults for the fields below.
    #[serde(default)]
    pub preset: Option<String>,
    /// Disabled sources are skipped by the poll cycle.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// How to fetch raw records.
    #[serde(default)]
    pub tool: Option<ToolDescriptor>,
    /// Key holding the record array when the tool returns an object.
    #[serde(default)]
    pub response_key: Option<String>,
    /// Identifier template, e.g. `github:{repository.full_name}#{number}`.
    #[serde(default)]
    pub id_template: Option<String>,
    /// Template resolving an item to a key of the `[repos]` table.
    #[serde(default)]
    pub repo: Option<String>,
    /// Destination field -> source path (or `field:/regex/`).
    #[serde(default)]
    pub mappings: Option<BTreeMap<String, String>>,
    /// Readiness gates.
    #[serde(default)]
    pub readiness: Option<ReadinessRules>,
    /// Source-level action overrides.
    #[serde(default)]
    pub action: ActionOverrides,
    /// Drop ledger records missing from the live fetch after this many days.
    #[serde(default)]
    pub cleanup_missing_after_days: Option<u32>,
}

impl SourceConfig {
    /// A minimal enabled source with no tool, used by presets and tests.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preset: None,
            enabled: true,
            tool: None,
            response_key: None,
            id_template: None,
            repo: None,
            mappings: None,
            readiness: None,
            action: ActionOverrides::default(),
            cleanup_missing_after_days: None,
        }
    }

    /// The validated tool descriptor.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no tool is configured or the
    /// descriptor is invalid.
    pub fn tool_kind(&self) -> Result<ToolKind<'_>> {
        self.tool
            .as_ref()
            .ok_or_else(|| AppError::Config("no tool configured".into()))?
            .kind()
    }
}
