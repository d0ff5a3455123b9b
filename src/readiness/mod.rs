//! Item readiness gates.
//!
//! Provides the fixed-order gate chain deciding whether an item is
//! actionable now, plus derivation of the `_has_attention` enrichment.

pub mod attention;
pub mod evaluator;

pub use evaluator::{Readiness, ReadinessEvaluator};
