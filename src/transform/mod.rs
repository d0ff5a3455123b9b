//! Record shaping: field references, mappings, identifiers, templates.
//!
//! Raw tool output is parsed into records ([`records`]), normalized via a
//! source's mapping table and identifier template ([`mapper`]), and later
//! rendered into prompts and titles ([`template`]). All lookups go through
//! the field extractor ([`extractor`]).

pub mod extractor;
pub mod mapper;
pub mod records;
pub mod template;
