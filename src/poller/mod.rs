//! Processed-item state tracking.

use std::sync::{Arc, Mutex};

pub mod expiry;
pub mod ledger;

pub use ledger::Poller;

/// Ledger shared between the poll loop and the expiry task.
///
/// Ledger operations are synchronous; the lock is never held across an
/// `.await`.
pub type SharedPoller = Arc<Mutex<Poller>>;
