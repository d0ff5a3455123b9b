//! Wire models for the remote session server.
//!
//! The server owns session identity; these types only mirror what its
//! HTTP endpoints return. Every field is optional on the wire so that a
//! partial payload can be detected and skipped instead of failing the
//! whole response.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

/// Creation/update timestamps reported for a project.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ProjectTime {
    /// Creation time (epoch milliseconds).
    #[serde(default)]
    pub created: Option<Value>,
}

/// Raw `GET /project/current` payload.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ProjectPayload {
    /// Project identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Declared workspace root.
    #[serde(default)]
    pub worktree: Option<String>,
    /// Known isolated workspaces (sandboxes) for this project.
    #[serde(default)]
    pub sandboxes: Vec<String>,
    /// Timestamps.
    #[serde(default)]
    pub time: Option<ProjectTime>,
}

/// A project payload that carried every required field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Project identifier.
    pub id: String,
    /// Declared workspace root.
    pub root: PathBuf,
    /// Known isolated workspaces.
    pub sandboxes: Vec<PathBuf>,
}

impl ProjectPayload {
    /// Validate identity and creation time; incomplete payloads yield `None`.
    #[must_use]
    pub fn validate(self) -> Option<Project> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let created = self.time.and_then(|time| time.created)?;
        if created.is_null() {
            return None;
        }
        let root = self.worktree.filter(|root| !root.is_empty())?;
        Some(Project {
            id,
            root: PathBuf::from(root),
            sandboxes: self
                .sandboxes
                .into_iter()
                .filter(|path| !path.is_empty())
                .map(PathBuf::from)
                .collect(),
        })
    }
}

/// Session timestamps.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SessionTime {
    /// Creation time (epoch milliseconds).
    #[serde(default)]
    pub created: Option<i64>,
    /// Last update time (epoch milliseconds).
    #[serde(default)]
    pub updated: Option<i64>,
    /// Archival marker; any non-empty value means archived.
    #[serde(default)]
    pub archived: Option<Value>,
}

/// A session as listed by `GET /session`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteSession {
    /// Server-assigned identifier.
    pub id: String,
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Directory the session is bound to.
    #[serde(default)]
    pub directory: Option<String>,
    /// Timestamps.
    #[serde(default)]
    pub time: SessionTime,
}

impl RemoteSession {
    /// Whether the session carries a non-empty archival timestamp.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        match &self.time.archived {
            None | Some(Value::Null) => false,
            Some(Value::String(ts)) => !ts.is_empty(),
            Some(Value::Number(ts)) => ts.as_f64().is_some_and(|ts| ts != 0.0),
            Some(Value::Bool(flag)) => *flag,
            Some(_) => true,
        }
    }

    /// Last update time, falling back to creation time.
    #[must_use]
    pub fn updated(&self) -> i64 {
        self.time.updated.or(self.time.created).unwrap_or(0)
    }
}

/// Activity status reported by `GET /session/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionActivity {
    /// Waiting for input.
    #[default]
    Idle,
    /// Working on a message.
    Busy,
    /// Retrying a failed model call.
    Retry,
}

impl SessionActivity {
    /// Parse the `type` tag of a status entry. Unknown tags count as idle.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "busy" => Self::Busy,
            "retry" => Self::Retry,
            _ => Self::Idle,
        }
    }

    /// Busy or retrying.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Busy | Self::Retry)
    }
}

/// An isolated workspace returned by `POST /experimental/worktree`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Worktree {
    /// Workspace name.
    #[serde(default)]
    pub name: Option<String>,
    /// Branch checked out in the workspace.
    #[serde(default)]
    pub branch: Option<String>,
    /// Absolute path of the workspace.
    #[serde(default)]
    pub directory: Option<String>,
}
