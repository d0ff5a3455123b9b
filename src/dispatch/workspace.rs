//! Workspace resolution: plain directory or isolated worktree.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::client::SessionServer;
use crate::models::action::WorkspacePolicy;
use crate::models::item::Item;
use crate::models::session::Project;
use crate::transform::template;

/// Inputs for [`resolve_workspace`].
#[derive(Debug, Clone, Copy)]
pub struct WorkspaceRequest<'a> {
    /// Server that owns the directory.
    pub base_url: &'a str,
    /// Resolved target directory.
    pub directory: &'a Path,
    /// Configured policy; `None` means auto-detect.
    pub policy: Option<&'a WorkspacePolicy>,
    /// Name template for workspaces created on demand.
    pub name_template: Option<&'a str>,
    /// Item being dispatched (for name expansion).
    pub item: &'a Item,
    /// Project reported during discovery, if any.
    pub project: Option<&'a Project>,
}

/// Pick the directory the session should run in.
///
/// Never fails: any remote error falls back to the plain directory.
pub async fn resolve_workspace(server: &dyn SessionServer, request: WorkspaceRequest<'_>) -> PathBuf {
    let directory = request.directory;
    match request.policy {
        Some(WorkspacePolicy::None) => directory.to_path_buf(),
        Some(WorkspacePolicy::Named(name)) => find_named(server, request.base_url, directory, name)
            .await
            .unwrap_or_else(|| directory.to_path_buf()),
        Some(WorkspacePolicy::New) => create(server, &request).await,
        None => {
            if has_isolated_workspaces(server, &request).await {
                debug!(directory = %directory.display(), "project uses worktrees, creating one");
                create(server, &request).await
            } else {
                directory.to_path_buf()
            }
        }
    }
}

/// Look up an existing workspace by name among the server's known ones.
async fn find_named(
    server: &dyn SessionServer,
    base_url: &str,
    directory: &Path,
    name: &str,
) -> Option<PathBuf> {
    let dir = directory.to_string_lossy();
    let known = match server.list_worktrees(base_url, &dir).await {
        Ok(known) => known,
        Err(err) => {
            warn!(%err, worktree = name, "failed to list worktrees");
            return None;
        }
    };
    let found = known
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.ends_with(name));
    if found.is_none() {
        warn!(
            worktree = name,
            directory = %directory.display(),
            "named worktree not found, using plain directory"
        );
    }
    found
}

/// Ask the server for a fresh workspace; fall back to the plain directory.
async fn create(server: &dyn SessionServer, request: &WorkspaceRequest<'_>) -> PathBuf {
    let name = request
        .name_template
        .map(|tpl| slugify(&template::render(tpl, request.item)))
        .filter(|name| !name.is_empty());
    let dir = request.directory.to_string_lossy();

    match server
        .create_worktree(request.base_url, &dir, name.as_deref())
        .await
    {
        Ok(worktree) => match worktree.directory.filter(|path| !path.is_empty()) {
            Some(path) => {
                info!(worktree = %path, name = worktree.name.as_deref().unwrap_or(""), "worktree created");
                PathBuf::from(path)
            }
            None => {
                warn!("worktree response carried no directory, using plain directory");
                request.directory.to_path_buf()
            }
        },
        Err(err) => {
            warn!(%err, directory = %dir, "worktree creation failed, using plain directory");
            request.directory.to_path_buf()
        }
    }
}

/// Whether the project owning the directory already has isolated workspaces.
///
/// Prefers the server's project list (most specific root containing the
/// directory) and falls back to the project seen during discovery.
async fn has_isolated_workspaces(server: &dyn SessionServer, request: &WorkspaceRequest<'_>) -> bool {
    let listed = match server.list_projects(request.base_url).await {
        Ok(projects) => projects
            .into_iter()
            .filter_map(crate::models::session::ProjectPayload::validate)
            .filter_map(|project| {
                super::discovery::match_score(&project, request.directory)
                    .map(|score| (score, project))
            })
            .max_by_key(|(score, _)| *score)
            .map(|(_, project)| project),
        Err(err) => {
            debug!(%err, "project list unavailable");
            None
        }
    };
    listed
        .as_ref()
        .or(request.project)
        .is_some_and(|project| !project.sandboxes.is_empty())
}

/// Reduce a rendered name to `[A-Za-z0-9._-]`, collapsing other runs to `-`.
#[must_use]
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut dash = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            slug.push(ch);
            dash = false;
        } else if !dash && !slug.is_empty() {
            slug.push('-');
            dash = true;
        }
    }
    slug.trim_end_matches('-').to_owned()
}
