//! Durable processed-item ledger.
//!
//! The ledger records which item identifiers have been dispatched, from
//! which source, and the item fingerprint seen at the time. It is loaded
//! once at construction and rewritten in full after every mutation, so
//! independent instances pointed at the same file see each other's writes
//! on their next load (last writer wins).

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde_json::Map;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::models::item::Item;
use crate::models::ledger::{LedgerDocument, ProcessedMeta, ProcessedRecord};
use crate::models::timestamp;
use crate::{AppError, Result};

/// Default age after which records expire.
pub const DEFAULT_TTL_DAYS: u32 = 30;

/// Lifecycle transitions that count as "the item changed meaningfully".
///
/// Compared case-insensitively as `(stored, current)`.
const REOPEN_TRANSITIONS: &[(&str, &str)] = &[("closed", "open"), ("merged", "open")];

/// Per-identifier processing ledger backed by a JSON file.
#[derive(Debug)]
pub struct Poller {
    path: PathBuf,
    document: LedgerDocument,
}

impl Poller {
    /// Load the ledger stored at `path`.
    ///
    /// A missing file starts an empty ledger. A file that does not parse
    /// is logged and treated as empty; it is replaced on the next write.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` if the file exists but cannot be read.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|err| {
                AppError::Ledger(format!("failed to read {}: {err}", path.display()))
            })?;
            if raw.trim().is_empty() {
                LedgerDocument::default()
            } else {
                match serde_json::from_str::<LedgerDocument>(&raw) {
                    Ok(document) => document,
                    Err(err) => {
                        warn!(
                            path = %path.display(),
                            %err,
                            "ledger file is malformed, starting fresh"
                        );
                        LedgerDocument::default()
                    }
                }
            }
        } else {
            LedgerDocument::default()
        };

        debug!(
            path = %path.display(),
            records = document.processed.len(),
            "ledger loaded"
        );
        Ok(Self { path, document })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `id` has a record.
    #[must_use]
    pub fn is_processed(&self, id: &str) -> bool {
        self.document.processed.contains_key(id)
    }

    /// The record for `id`, if any.
    #[must_use]
    pub fn record(&self, id: &str) -> Option<&ProcessedRecord> {
        self.document.processed.get(id)
    }

    /// All records keyed by identifier.
    #[must_use]
    pub fn records(&self) -> &BTreeMap<String, ProcessedRecord> {
        &self.document.processed
    }

    /// Upsert the record for `id`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` if the ledger cannot be persisted.
    pub fn mark_processed(&mut self, id: &str, meta: ProcessedMeta) -> Result<()> {
        self.mark_processed_at(id, meta, Utc::now())
    }

    /// Upsert the record for `id` with an explicit processing time.
    ///
    /// Fields unknown to this version survive the update.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` if the ledger cannot be persisted.
    pub fn mark_processed_at(
        &mut self,
        id: &str,
        meta: ProcessedMeta,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        let extra = self
            .document
            .processed
            .remove(id)
            .map(|previous| previous.extra)
            .unwrap_or_else(Map::new);
        self.document.processed.insert(
            id.to_owned(),
            ProcessedRecord {
                processed_at,
                source: meta.source,
                item_state: meta.item_state,
                item_updated_at: meta.item_updated_at,
                extra,
            },
        );
        self.save()
    }

    /// Whether an already-processed item should be dispatched again.
    ///
    /// - Unseen items and records without a stored state return `false`.
    /// - A known reopen transition (closed → open, merged → open) returns `true`.
    /// - An `updated_at` strictly newer than the stored one returns `true`.
    #[must_use]
    pub fn should_reprocess(&self, item: &Item) -> bool {
        let Some(id) = item.id() else {
            return false;
        };
        let Some(record) = self.document.processed.get(&id) else {
            return false;
        };
        let Some(stored_state) = record.item_state.as_deref() else {
            return false;
        };

        if let Some(current_state) = item.state() {
            if is_reopen(stored_state, &current_state) {
                debug!(item_id = %id, from = stored_state, to = %current_state, "item reopened");
                return true;
            }
        }

        match (item.updated_at(), record.item_updated_at.as_deref()) {
            (Some(current), Some(stored)) => is_newer(&current, stored),
            _ => false,
        }
    }

    /// Every processed identifier.
    #[must_use]
    pub fn processed_ids(&self) -> Vec<String> {
        self.document.processed.keys().cloned().collect()
    }

    /// Number of records, optionally restricted to one source.
    #[must_use]
    pub fn processed_count(&self, source: Option<&str>) -> usize {
        match source {
            Some(source) => self
                .document
                .processed
                .values()
                .filter(|record| record.source == source)
                .count(),
            None => self.document.processed.len(),
        }
    }

    /// Remove the record for `id`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` if the ledger cannot be persisted.
    pub fn clear_processed(&mut self, id: &str) -> Result<bool> {
        if self.document.processed.remove(id).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Remove every record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` if the ledger cannot be persisted.
    pub fn clear_state(&mut self) -> Result<()> {
        self.document.processed.clear();
        self.save()
    }

    /// Remove every record belonging to `source`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` if the ledger cannot be persisted.
    pub fn clear_by_source(&mut self, source: &str) -> Result<usize> {
        self.remove_where(|_, record| record.source == source)
    }

    /// Remove records processed more than `ttl_days` ago.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` if the ledger cannot be persisted.
    pub fn cleanup_expired(&mut self, ttl_days: u32) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(ttl_days));
        let removed = self.remove_where(|_, record| record.processed_at < cutoff)?;
        if removed > 0 {
            info!(removed, ttl_days, "expired ledger records removed");
        }
        Ok(removed)
    }

    /// Remove `source` records absent from `current_ids` and at least
    /// `min_age_days` old.
    ///
    /// The age floor keeps a transient empty or partial fetch from
    /// evicting records that were written moments ago.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ledger` if the ledger cannot be persisted.
    pub fn cleanup_missing_from_source<S: AsRef<str>>(
        &mut self,
        source: &str,
        current_ids: &[S],
        min_age_days: u32,
    ) -> Result<usize> {
        let current: HashSet<&str> = current_ids.iter().map(AsRef::as_ref).collect();
        let cutoff = Utc::now() - Duration::days(i64::from(min_age_days));
        let removed = self.remove_where(|id, record| {
            record.source == source
                && !current.contains(id.as_str())
                && record.processed_at <= cutoff
        })?;
        if removed > 0 {
            info!(source, removed, min_age_days, "records missing from source removed");
        }
        Ok(removed)
    }

    fn remove_where(
        &mut self,
        mut predicate: impl FnMut(&String, &ProcessedRecord) -> bool,
    ) -> Result<usize> {
        let before = self.document.processed.len();
        self.document
            .processed
            .retain(|id, record| !predicate(id, record));
        let removed = before - self.document.processed.len();
        if removed > 0 {
            self.save()?;
        }
        Ok(removed)
    }

    /// Atomically replace the backing file with the current document.
    fn save(&self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|err| {
            AppError::Ledger(format!("failed to create {}: {err}", parent.display()))
        })?;

        let body = serde_json::to_string_pretty(&self.document)
            .map_err(|err| AppError::Ledger(format!("failed to serialize ledger: {err}")))?;

        let mut tmp = NamedTempFile::new_in(&parent)
            .map_err(|err| AppError::Ledger(format!("failed to create temporary file: {err}")))?;
        tmp.write_all(body.as_bytes())
            .map_err(|err| AppError::Ledger(format!("failed to write temporary file: {err}")))?;
        tmp.persist(&self.path).map_err(|err| {
            AppError::Ledger(format!(
                "failed to persist ledger to {}: {err}",
                self.path.display()
            ))
        })?;
        Ok(())
    }
}

fn is_reopen(stored: &str, current: &str) -> bool {
    REOPEN_TRANSITIONS.iter().any(|(from, to)| {
        stored.trim().eq_ignore_ascii_case(from) && current.trim().eq_ignore_ascii_case(to)
    })
}

/// Whether timestamp `current` is strictly later than `stored`.
///
/// Both sides go through the same normalization, so records written with
/// a provider's raw format still compare. Unparseable timestamps never
/// count as newer.
fn is_newer(current: &str, stored: &str) -> bool {
    match (timestamp::parse_str(current), timestamp::parse_str(stored)) {
        (Some(current), Some(stored)) => current > stored,
        _ => false,
    }
}
