//! Item → session dispatch.
//!
//! Discovery, workspace resolution, session resolution and the message post
//! run strictly in sequence for one item. Nothing here returns an error:
//! every path ends in a [`DispatchOutcome`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use super::client::{MessageRequest, SessionServer};
use super::discovery::ServerLocator;
use super::selection::select_session;
use super::workspace::{resolve_workspace, WorkspaceRequest};
use crate::config::expand_home;
use crate::models::action::ActionConfig;
use crate::models::item::Item;
use crate::transform::template;

/// Result of dispatching one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A session received (or owns) the work.
    Dispatched {
        /// Session that received the message.
        session_id: String,
        /// Workspace the session is bound to.
        directory: PathBuf,
        /// Base URL of the server.
        server: String,
        /// Whether an existing session was reused.
        reused: bool,
        /// Set when the session was created but the message did not land.
        warning: Option<String>,
    },
    /// The item has no local home; nothing was attempted.
    Skipped {
        /// Why dispatch was not attempted.
        reason: String,
    },
    /// Dispatch was attempted and did not reach a session.
    Failed {
        /// What went wrong.
        reason: String,
    },
}

impl DispatchOutcome {
    /// Whether a session now owns the item.
    #[must_use]
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Delivers ready items to agent sessions.
pub struct Dispatcher {
    server: Arc<dyn SessionServer>,
    locator: Arc<dyn ServerLocator>,
}

impl Dispatcher {
    /// Create a dispatcher over a session-server transport and a locator.
    #[must_use]
    pub fn new(server: Arc<dyn SessionServer>, locator: Arc<dyn ServerLocator>) -> Self {
        Self { server, locator }
    }

    /// Deliver `message` for `item` according to `action`.
    pub async fn dispatch(&self, item: &Item, action: &ActionConfig, message: &str) -> DispatchOutcome {
        let item_id = item.id().unwrap_or_default();
        let span = info_span!("dispatch", item_id = %item_id);
        self.dispatch_inner(item, action, message).instrument(span).await
    }

    async fn dispatch_inner(&self, item: &Item, action: &ActionConfig, message: &str) -> DispatchOutcome {
        let Some(directory) = target_directory(item, action) else {
            return DispatchOutcome::Skipped {
                reason: "no local directory configured for item".into(),
            };
        };

        let Some(found) = self.locator.locate(&directory).await else {
            warn!(directory = %directory.display(), "no running server for directory");
            return DispatchOutcome::failed(format!(
                "no server found for {}",
                directory.display()
            ));
        };
        let base_url = found.base_url.as_str();
        debug!(server = base_url, directory = %directory.display(), "server located");

        let workspace = resolve_workspace(
            self.server.as_ref(),
            WorkspaceRequest {
                base_url,
                directory: &directory,
                policy: action.workspace.as_ref(),
                name_template: action.worktree_name.as_deref(),
                item,
                project: found.project.as_ref(),
            },
        )
        .await;
        let workspace_str = workspace.to_string_lossy().into_owned();

        let request = MessageRequest::text(message, action.agent.clone(), action.model.as_deref());

        // ── 1. Reuse ────────────────────────────────────────
        if action.reuse_session {
            if let Some(session_id) = self.find_reusable(base_url, &workspace, &workspace_str).await {
                return match self
                    .server
                    .post_message(base_url, &session_id, &workspace_str, &request)
                    .await
                {
                    Ok(()) => {
                        info!(server = base_url, session_id, "message sent to existing session");
                        DispatchOutcome::Dispatched {
                            session_id,
                            directory: workspace,
                            server: base_url.to_owned(),
                            reused: true,
                            warning: None,
                        }
                    }
                    Err(err) => {
                        warn!(server = base_url, session_id, %err, "message post failed");
                        DispatchOutcome::failed(format!("message post to {session_id} failed: {err}"))
                    }
                };
            }
        }

        // ── 2. Create ───────────────────────────────────────
        let session = match self.server.create_session(base_url, &workspace_str).await {
            Ok(session) => session,
            Err(err) => {
                warn!(server = base_url, %err, "session creation failed");
                return DispatchOutcome::failed(format!("session creation failed: {err}"));
            }
        };
        info!(server = base_url, session_id = %session.id, directory = %workspace_str, "session created");

        if let Some(title_template) = &action.session_name {
            let title = template::render(title_template, item);
            if !title.trim().is_empty() {
                if let Err(err) = self
                    .server
                    .set_title(base_url, &session.id, &workspace_str, title.trim())
                    .await
                {
                    warn!(session_id = %session.id, %err, "failed to set session title");
                }
            }
        }

        // ── 3. Post ─────────────────────────────────────────
        let warning = match self
            .server
            .post_message(base_url, &session.id, &workspace_str, &request)
            .await
        {
            Ok(()) => None,
            Err(err) => {
                warn!(session_id = %session.id, %err, "session created but message post failed");
                Some(format!("message not delivered: {err}"))
            }
        };

        DispatchOutcome::Dispatched {
            session_id: session.id,
            directory: workspace,
            server: base_url.to_owned(),
            reused: false,
            warning,
        }
    }

    /// Listing failures count as "no sessions".
    async fn find_reusable(&self, base_url: &str, workspace: &Path, workspace_str: &str) -> Option<String> {
        let sessions = self
            .server
            .list_sessions(base_url, workspace_str)
            .await
            .inspect_err(|err| debug!(%err, "session listing failed"))
            .unwrap_or_default();
        if sessions.is_empty() {
            return None;
        }
        let statuses = self
            .server
            .session_statuses(base_url, workspace_str)
            .await
            .inspect_err(|err| debug!(%err, "session status unavailable"))
            .unwrap_or_default();
        select_session(sessions, &statuses, workspace).map(|session| session.id)
    }
}

/// Expand the working-directory template; partially unresolved paths yield `None`.
#[must_use]
pub fn target_directory(item: &Item, action: &ActionConfig) -> Option<PathBuf> {
    let raw = action.working_dir.as_deref()?;
    let expanded = template::render_strict(raw, item)?;
    let trimmed = expanded.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(expand_home(trimmed))
}
