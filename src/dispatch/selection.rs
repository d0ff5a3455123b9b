//! Choosing an existing session to reuse.

use std::collections::HashMap;
use std::path::Path;

use crate::models::session::{RemoteSession, SessionActivity};

/// Pick the session to reuse for `workspace`, if any.
///
/// Archived sessions and sessions bound to another directory are ignored.
/// Idle sessions are preferred, most recently updated first; if every
/// candidate is busy or retrying, the most recently updated one is used.
#[must_use]
pub fn select_session(
    sessions: Vec<RemoteSession>,
    statuses: &HashMap<String, SessionActivity>,
    workspace: &Path,
) -> Option<RemoteSession> {
    let candidates: Vec<RemoteSession> = sessions
        .into_iter()
        .filter(|session| !session.is_archived())
        .filter(|session| {
            session
                .directory
                .as_deref()
                .is_none_or(|dir| Path::new(dir) == workspace)
        })
        .collect();

    let is_active = |session: &RemoteSession| {
        statuses
            .get(&session.id)
            .copied()
            .unwrap_or_default()
            .is_active()
    };

    let idle = candidates
        .iter()
        .filter(|session| !is_active(session))
        .max_by_key(|session| session.updated())
        .cloned();
    idle.or_else(|| {
        candidates
            .into_iter()
            .max_by_key(RemoteSession::updated)
    })
}
