//! Operator notifications for dispatch outcomes.

use std::path::PathBuf;

use tracing::{info, warn};

/// A human-readable event about one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A session received the item.
    Dispatched {
        /// Source the item came from.
        source: String,
        /// Item identifier.
        item_id: String,
        /// Session that owns the work.
        session_id: String,
        /// Workspace the session runs in.
        directory: PathBuf,
        /// Whether an existing session was reused.
        reused: bool,
        /// Partial-success warning, if any.
        warning: Option<String>,
    },
    /// The item was ready but had nowhere to go.
    Skipped {
        /// Source the item came from.
        source: String,
        /// Item identifier.
        item_id: String,
        /// Why it was skipped.
        reason: String,
    },
    /// Dispatch failed; the item stays unprocessed and is retried next cycle.
    Failed {
        /// Source the item came from.
        source: String,
        /// Item identifier.
        item_id: String,
        /// What went wrong.
        reason: String,
    },
}

/// Fire-and-forget sink for [`Notification`]s.
pub trait Notifier: Send + Sync {
    /// Deliver one notification. Must not block or fail the caller.
    fn notify(&self, notification: &Notification);
}

/// Writes notifications to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::Dispatched {
                source,
                item_id,
                session_id,
                directory,
                reused,
                warning: None,
            } => info!(
                source,
                item_id,
                session_id,
                directory = %directory.display(),
                reused,
                "item dispatched"
            ),
            Notification::Dispatched {
                source,
                item_id,
                session_id,
                warning: Some(warning),
                ..
            } => warn!(source, item_id, session_id, warning, "item dispatched with warning"),
            Notification::Skipped {
                source,
                item_id,
                reason,
            } => info!(source, item_id, reason, "item skipped"),
            Notification::Failed {
                source,
                item_id,
                reason,
            } => warn!(source, item_id, reason, "item dispatch failed"),
        }
    }
}
