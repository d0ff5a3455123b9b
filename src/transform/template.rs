//! `{path}` placeholder expansion and prompt template loading.

use std::fs;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{debug, warn};

use super::extractor;
use crate::models::item::Item;
use crate::{AppError, Result};

/// Prompt used when no template file exists for the configured name.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "{title}\n\n{body}";

/// What to do with a placeholder that resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    /// Leave `{path}` in the output verbatim.
    Keep,
    /// Replace it with the empty string.
    Empty,
}

/// A `{path}` occurrence inside a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// Byte offset of the opening brace.
    pub start: usize,
    /// Byte offset one past the closing brace.
    pub end: usize,
    /// Field reference between the braces.
    pub path: &'a str,
}

/// Find every placeholder in `template`.
///
/// Braces nest, so regex references such as `{body:/(\d{3})/}` are one
/// placeholder. An unbalanced `{` is literal text.
#[must_use]
pub fn placeholders(template: &str) -> Vec<Placeholder<'_>> {
    let bytes = template.as_bytes();
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = template[cursor..].find('{') {
        let start = cursor + offset;
        let mut depth = 0usize;
        let mut close = None;
        for (idx, byte) in bytes.iter().enumerate().skip(start) {
            match byte {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(idx);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(close) = close else {
            break;
        };
        let path = &template[start + 1..close];
        if path.trim().is_empty() {
            cursor = close + 1;
            continue;
        }
        found.push(Placeholder {
            start,
            end: close + 1,
            path,
        });
        cursor = close + 1;
    }
    found
}

/// Result of expanding a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Expanded text.
    pub text: String,
    /// Number of placeholders that resolved to nothing.
    pub unresolved: usize,
}

impl Expansion {
    /// Whether every placeholder resolved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unresolved == 0
    }
}

/// Expand every placeholder in `template` against `record`.
#[must_use]
pub fn expand(template: &str, record: &Value, unresolved: Unresolved) -> String {
    expand_checked(template, record, unresolved).text
}

/// Expand `template`, counting placeholders that failed to resolve.
///
/// The count comes from substitution itself, so resolved values that
/// happen to contain braces never look unresolved.
#[must_use]
pub fn expand_checked(template: &str, record: &Value, unresolved: Unresolved) -> Expansion {
    let mut text = String::with_capacity(template.len());
    let mut missing = 0;
    let mut cursor = 0;
    for placeholder in placeholders(template) {
        text.push_str(&template[cursor..placeholder.start]);
        match extractor::resolve_text(record, placeholder.path.trim()) {
            Some(value) => text.push_str(&value),
            None => {
                missing += 1;
                if unresolved == Unresolved::Keep {
                    text.push_str(&template[placeholder.start..placeholder.end]);
                }
            }
        }
        cursor = placeholder.end;
    }
    text.push_str(&template[cursor..]);
    Expansion {
        text,
        unresolved: missing,
    }
}

/// Render prompt or title text for an item; missing fields render empty.
#[must_use]
pub fn render(template: &str, item: &Item) -> String {
    expand(template, item.as_value(), Unresolved::Empty)
}

/// Expand a template that must resolve completely.
///
/// Returns `None` when any placeholder is left unresolved; used for
/// working directories, where a half-expanded path would be wrong.
#[must_use]
pub fn render_strict(template: &str, item: &Item) -> Option<String> {
    let expansion = expand_checked(template, item.as_value(), Unresolved::Keep);
    expansion.is_complete().then_some(expansion.text)
}

/// Directory of `<name>.md` prompt templates.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    dir: Option<PathBuf>,
}

impl PromptLibrary {
    /// Library rooted at `dir`; `None` serves only the built-in default.
    #[must_use]
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Load the template called `name`.
    ///
    /// A missing file falls back to [`DEFAULT_PROMPT_TEMPLATE`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Template` if the file exists but cannot be read.
    pub fn load(&self, name: &str) -> Result<String> {
        let Some(dir) = &self.dir else {
            return Ok(DEFAULT_PROMPT_TEMPLATE.to_owned());
        };
        let path = dir.join(format!("{name}.md"));
        if !path.exists() {
            if name == crate::models::action::DEFAULT_PROMPT {
                debug!(path = %path.display(), "no default prompt file, using built-in");
            } else {
                warn!(template = name, path = %path.display(), "prompt template not found, using default");
            }
            return Ok(DEFAULT_PROMPT_TEMPLATE.to_owned());
        }
        fs::read_to_string(&path).map_err(|err| {
            AppError::Template(format!("failed to read {}: {err}", path.display()))
        })
    }
}
