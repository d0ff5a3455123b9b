//! Global configuration parsing and validation.

use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::action::{ActionOverrides, RepoConfig};
use crate::models::source::SourceConfig;
use crate::presets;
use crate::{AppError, Result};

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_poll_interval() -> u64 {
    300
}

fn default_ledger_ttl_days() -> u32 {
    crate::poller::ledger::DEFAULT_TTL_DAYS
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_tool_timeout() -> u64 {
    120
}

/// Where session servers listen.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Host probed for each entry of `ports`.
    #[serde(default = "default_host")]
    pub host: String,
    /// Local ports to probe.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Explicit base URLs, probed before `ports`.
    #[serde(default)]
    pub urls: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            ports: Vec::new(),
            urls: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Every base URL to probe, explicit URLs first.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        self.urls
            .iter()
            .map(|url| url.trim_end_matches('/').to_owned())
            .chain(
                self.ports
                    .iter()
                    .map(|port| format!("http://{}:{port}", self.host)),
            )
            .collect()
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Processed-item ledger file.
    pub ledger_path: PathBuf,
    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Ledger records older than this are purged.
    #[serde(default = "default_ledger_ttl_days")]
    pub ledger_ttl_days: u32,
    /// Directory of `<name>.md` prompt templates.
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,
    /// Per-request timeout for session server calls.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Timeout for a source's fetch command.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_seconds: u64,
    /// Session server endpoints.
    #[serde(default)]
    pub server: ServerConfig,
    /// Action defaults applied beneath repo and source overrides.
    #[serde(default)]
    pub defaults: ActionOverrides,
    /// Repo key -> local checkout and overrides.
    #[serde(default)]
    pub repos: HashMap<String, RepoConfig>,
    /// Configured item sources.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read config {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string, apply presets and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Delay between poll cycles.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Per-request timeout for session server calls.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Timeout for fetch commands.
    #[must_use]
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_seconds)
    }

    /// Look up a source by name.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|source| source.name == name)
    }

    fn validate(&mut self) -> Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "poll_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.server.endpoints().is_empty() {
            return Err(AppError::Config(
                "server.ports or server.urls must list at least one endpoint".into(),
            ));
        }

        self.ledger_path = expand_home(&self.ledger_path.to_string_lossy());
        self.prompts_dir = self
            .prompts_dir
            .as_ref()
            .map(|dir| expand_home(&dir.to_string_lossy()));

        let mut seen = HashSet::new();
        let sources = std::mem::take(&mut self.sources);
        for source in sources {
            if source.name.trim().is_empty() {
                return Err(AppError::Config("source name must not be empty".into()));
            }
            if !seen.insert(source.name.clone()) {
                return Err(AppError::Config(format!(
                    "duplicate source name `{}`",
                    source.name
                )));
            }
            let source = presets::apply_preset(source)?;
            source.tool_kind().map_err(|err| match err {
                AppError::Config(msg) => AppError::Config(format!("source `{}`: {msg}", source.name)),
                other => other,
            })?;
            self.sources.push(source);
        }

        Ok(())
    }
}

/// Expand a leading `~` against `HOME`. Other paths are returned unchanged.
#[must_use]
pub fn expand_home(raw: &str) -> PathBuf {
    let home = || env::var_os("HOME").map(PathBuf::from);
    if raw == "~" {
        if let Some(home) = home() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = home() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
