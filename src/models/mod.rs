//! Domain model module declarations.

pub mod action;
pub mod item;
pub mod ledger;
pub mod session;
pub mod source;
pub mod timestamp;
