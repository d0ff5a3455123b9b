//! Locate the running session server responsible for a directory.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info_span, Instrument};

use super::client::SessionServer;
use crate::models::session::Project;

/// A server chosen for a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMatch {
    /// Base URL of the server.
    pub base_url: String,
    /// Project the server reported, when discovery inspected it.
    pub project: Option<Project>,
}

/// Finds the server that should receive work for a directory.
pub trait ServerLocator: Send + Sync {
    /// Return the best server for `directory`, or `None` if nothing fits.
    fn locate<'a>(
        &'a self,
        directory: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Option<ServerMatch>> + Send + 'a>>;
}

/// Any `Fn(&Path) -> Option<String>` locates a bare server URL.
impl<F> ServerLocator for F
where
    F: Fn(&Path) -> Option<String> + Send + Sync,
{
    fn locate<'a>(
        &'a self,
        directory: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Option<ServerMatch>> + Send + 'a>> {
        let found = self(directory).map(|base_url| ServerMatch {
            base_url,
            project: None,
        });
        Box::pin(async move { found })
    }
}

/// Locator that asks each known server for its current project.
///
/// A server qualifies when its project root equals or contains the
/// directory, or one of its isolated workspaces does. The longest matching
/// path wins. A server whose root is `/` is only used when no specific
/// match exists. Unreachable servers and incomplete project payloads are
/// skipped.
pub struct ProjectLocator {
    server: Arc<dyn SessionServer>,
    endpoints: Vec<String>,
}

impl ProjectLocator {
    /// Locator over the given server base URLs.
    #[must_use]
    pub fn new(server: Arc<dyn SessionServer>, endpoints: Vec<String>) -> Self {
        Self { server, endpoints }
    }

    /// Base URLs this locator probes.
    #[must_use]
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    async fn discover(&self, directory: &Path) -> Option<ServerMatch> {
        let mut best: Option<(usize, ServerMatch)> = None;
        let mut universal: Option<ServerMatch> = None;

        for base_url in &self.endpoints {
            let payload = match self.server.current_project(base_url).await {
                Ok(payload) => payload,
                Err(err) => {
                    debug!(server = %base_url, %err, "server unusable, skipping");
                    continue;
                }
            };
            let Some(project) = payload.validate() else {
                debug!(server = %base_url, "incomplete project payload, skipping");
                continue;
            };

            let Some(score) = match_score(&project, directory) else {
                if project.root == Path::new("/") && universal.is_none() {
                    universal = Some(ServerMatch {
                        base_url: base_url.clone(),
                        project: Some(project),
                    });
                }
                continue;
            };
            if best.as_ref().is_none_or(|(current, _)| score > *current) {
                best = Some((
                    score,
                    ServerMatch {
                        base_url: base_url.clone(),
                        project: Some(project),
                    },
                ));
            }
        }

        best.map(|(_, found)| found).or(universal)
    }
}

impl ServerLocator for ProjectLocator {
    fn locate<'a>(
        &'a self,
        directory: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Option<ServerMatch>> + Send + 'a>> {
        let span = info_span!("discover_server", directory = %directory.display());
        Box::pin(self.discover(directory).instrument(span))
    }
}

/// Length of the most specific project path containing `directory`.
///
/// The filesystem root contains everything and never counts as a specific
/// match, whether it is the project root or a sandbox.
#[must_use]
pub fn match_score(project: &Project, directory: &Path) -> Option<usize> {
    std::iter::once(&project.root)
        .chain(project.sandboxes.iter())
        .filter(|root| root.as_path() != Path::new("/") && directory.starts_with(root))
        .map(|root| root.as_os_str().len())
        .max()
}
