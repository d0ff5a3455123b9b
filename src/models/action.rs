//! Action configuration: what to do with a ready item.
//!
//! Three layers of partial configuration (source overrides, repo-level
//! configuration, global defaults) merge into one [`ActionConfig`] per
//! item. Every field is an `Option` so "not configured" stays distinct
//! from an explicit value such as `reuse_session = false`.

use serde::Deserialize;

/// Name of the prompt template used when no layer sets one.
pub const DEFAULT_PROMPT: &str = "default";

/// Isolated-workspace policy for a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum WorkspacePolicy {
    /// Use the resolved directory as-is.
    None,
    /// Create a fresh isolated workspace for every dispatch.
    New,
    /// Use an existing isolated workspace with this name.
    Named(String),
}

impl From<String> for WorkspacePolicy {
    fn from(raw: String) -> Self {
        match raw.trim() {
            "" | "none" | "false" => Self::None,
            "new" => Self::New,
            name => Self::Named(name.to_owned()),
        }
    }
}

/// Partial action configuration as written in a source, repo, or defaults table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ActionOverrides {
    /// Prompt template name.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Working-directory template (`{field}` placeholders allowed).
    #[serde(default, alias = "directory")]
    pub working_dir: Option<String>,
    /// Agent name passed to the session server.
    #[serde(default)]
    pub agent: Option<String>,
    /// Model as `provider/model-id`.
    #[serde(default)]
    pub model: Option<String>,
    /// Session title template.
    #[serde(default)]
    pub session_name: Option<String>,
    /// Isolated-workspace policy; unset means auto-detect.
    #[serde(default)]
    pub worktree: Option<WorkspacePolicy>,
    /// Name template for workspaces created on demand.
    #[serde(default)]
    pub worktree_name: Option<String>,
    /// Whether an existing session in the workspace may be reused.
    #[serde(default)]
    pub reuse_session: Option<bool>,
}

impl ActionOverrides {
    /// Layer `self` over `lower`: every field set here wins.
    #[must_use]
    pub fn over(&self, lower: &Self) -> Self {
        Self {
            prompt: self.prompt.clone().or_else(|| lower.prompt.clone()),
            working_dir: self.working_dir.clone().or_else(|| lower.working_dir.clone()),
            agent: self.agent.clone().or_else(|| lower.agent.clone()),
            model: self.model.clone().or_else(|| lower.model.clone()),
            session_name: self
                .session_name
                .clone()
                .or_else(|| lower.session_name.clone()),
            worktree: self.worktree.clone().or_else(|| lower.worktree.clone()),
            worktree_name: self
                .worktree_name
                .clone()
                .or_else(|| lower.worktree_name.clone()),
            reuse_session: self.reuse_session.or(lower.reuse_session),
        }
    }
}

/// Repo-level configuration: a local checkout plus its action overrides.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RepoConfig {
    /// Local checkout path for the repository.
    #[serde(default)]
    pub path: Option<String>,
    /// Overrides applied to items resolved to this repo.
    #[serde(flatten)]
    pub action: ActionOverrides,
}

impl RepoConfig {
    /// Repo overrides with `path` standing in for an unset `working_dir`.
    #[must_use]
    pub fn effective_overrides(&self) -> ActionOverrides {
        let mut action = self.action.clone();
        if action.working_dir.is_none() {
            action.working_dir.clone_from(&self.path);
        }
        action
    }
}

/// Fully merged action configuration for a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionConfig {
    /// Prompt template name.
    pub prompt: String,
    /// Working-directory template; `None` means the item has no local home.
    pub working_dir: Option<String>,
    /// Agent name.
    pub agent: Option<String>,
    /// Model as `provider/model-id`.
    pub model: Option<String>,
    /// Session title template.
    pub session_name: Option<String>,
    /// Isolated-workspace policy; `None` means auto-detect.
    pub workspace: Option<WorkspacePolicy>,
    /// Name template for workspaces created on demand.
    pub worktree_name: Option<String>,
    /// Whether an existing session may be reused.
    pub reuse_session: bool,
}

impl ActionConfig {
    /// Merge in precedence order: source > repo > defaults.
    #[must_use]
    pub fn resolve(
        source: &ActionOverrides,
        repo: Option<&RepoConfig>,
        defaults: &ActionOverrides,
    ) -> Self {
        let lower = match repo {
            Some(repo) => repo.effective_overrides().over(defaults),
            None => defaults.clone(),
        };
        let merged = source.over(&lower);
        Self {
            prompt: merged.prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_owned()),
            working_dir: merged.working_dir,
            agent: merged.agent,
            model: merged.model,
            session_name: merged.session_name,
            workspace: merged.worktree,
            worktree_name: merged.worktree_name,
            reuse_session: merged.reuse_session.unwrap_or(true),
        }
    }
}
