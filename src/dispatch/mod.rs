//! Session discovery and dispatch.

pub mod client;
pub mod discovery;
pub mod dispatcher;
pub mod selection;
pub mod workspace;

pub use client::{HttpSessionServer, MessageRequest, SessionServer};
pub use discovery::{ProjectLocator, ServerLocator, ServerMatch};
pub use dispatcher::{DispatchOutcome, Dispatcher};
