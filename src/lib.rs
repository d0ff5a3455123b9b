#![forbid(unsafe_code)]

//! `agent-relay`: polls work-item sources and dispatches ready items to
//! long-lived coding-agent sessions, exactly once per item.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod models;
pub mod notify;
pub mod poller;
pub mod presets;
pub mod readiness;
pub mod tools;
pub mod transform;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
