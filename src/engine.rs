//! Poll cycle: fetch → transform → readiness → ledger → dispatch.
//!
//! Sources run one after another; items within a source are dispatched in
//! fetch order. Errors never escape a cycle: each source ends in a
//! [`SourceReport`] and each item in a notification.

use std::sync::{Arc, MutexGuard};

use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::dispatch::client::HttpSessionServer;
use crate::dispatch::discovery::ProjectLocator;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::models::action::{ActionConfig, RepoConfig};
use crate::models::item::Item;
use crate::models::ledger::ProcessedMeta;
use crate::models::source::SourceConfig;
use crate::notify::{LogNotifier, Notification, Notifier};
use crate::poller::{Poller, SharedPoller};
use crate::readiness::attention::annotate_attention;
use crate::readiness::ReadinessEvaluator;
use crate::tools::{CommandInvoker, ToolInvoker};
use crate::transform::mapper::{transform_record, Transformed};
use crate::transform::records::parse_records;
use crate::transform::template::{self, PromptLibrary};
use crate::{AppError, Result};

/// Counters for one source in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    /// Source name.
    pub source: String,
    /// Records returned by the fetch.
    pub fetched: usize,
    /// Items whose identifier stayed partially unresolved.
    pub unresolved: usize,
    /// Items that passed readiness.
    pub ready: usize,
    /// Ready items skipped because the ledger already has them.
    pub already_processed: usize,
    /// Items delivered to a session.
    pub dispatched: usize,
    /// Items with no local directory.
    pub skipped: usize,
    /// Items whose dispatch failed.
    pub failed: usize,
    /// Ledger records removed because the source no longer returns them.
    pub cleaned: usize,
    /// Fetch error, if the source could not be polled.
    pub error: Option<String>,
}

/// Outcome of one full poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// One entry per enabled source, in configuration order.
    pub sources: Vec<SourceReport>,
}

impl CycleReport {
    /// Items dispatched across every source.
    #[must_use]
    pub fn dispatched(&self) -> usize {
        self.sources.iter().map(|report| report.dispatched).sum()
    }

    /// Items that failed across every source.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.sources.iter().map(|report| report.failed).sum()
    }

    /// The report for `source`, if it ran.
    #[must_use]
    pub fn source(&self, source: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|report| report.source == source)
    }
}

/// Runs poll cycles over the configured sources.
pub struct Engine {
    config: Arc<GlobalConfig>,
    ledger: SharedPoller,
    invoker: Arc<dyn ToolInvoker>,
    dispatcher: Dispatcher,
    prompts: PromptLibrary,
    notifier: Arc<dyn Notifier>,
}

impl Engine {
    /// Assemble an engine from explicit collaborators.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        ledger: SharedPoller,
        invoker: Arc<dyn ToolInvoker>,
        dispatcher: Dispatcher,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let prompts = PromptLibrary::new(config.prompts_dir.clone());
        Self {
            config,
            ledger,
            invoker,
            dispatcher,
            prompts,
            notifier,
        }
    }

    /// Wire the production collaborators: HTTP session server, project
    /// discovery over the configured endpoints, command tools, log notifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn from_config(config: Arc<GlobalConfig>, ledger: SharedPoller) -> Result<Self> {
        let server = Arc::new(HttpSessionServer::new(config.request_timeout())?);
        let locator = Arc::new(ProjectLocator::new(
            server.clone(),
            config.server.endpoints(),
        ));
        let dispatcher = Dispatcher::new(server, locator);
        let invoker = Arc::new(CommandInvoker::new(config.tool_timeout()));
        Ok(Self::new(
            config,
            ledger,
            invoker,
            dispatcher,
            Arc::new(LogNotifier),
        ))
    }

    /// Shared ledger handle.
    #[must_use]
    pub fn ledger(&self) -> &SharedPoller {
        &self.ledger
    }

    /// Poll every enabled source once.
    pub async fn run_cycle(&self) -> CycleReport {
        let span = info_span!("poll_cycle");
        async {
            let mut report = CycleReport::default();
            for source in self.config.sources.iter().filter(|source| source.enabled) {
                let source_report = self
                    .poll_source(source)
                    .instrument(info_span!("poll_source", source = %source.name))
                    .await;
                report.sources.push(source_report);
            }
            info!(
                sources = report.sources.len(),
                dispatched = report.dispatched(),
                failed = report.failed(),
                "poll cycle complete"
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Poll a single source.
    pub async fn poll_source(&self, source: &SourceConfig) -> SourceReport {
        let mut report = SourceReport {
            source: source.name.clone(),
            ..SourceReport::default()
        };

        let raw = match &source.tool {
            Some(tool) => self.invoker.invoke(&source.name, tool).await,
            None => Err(AppError::Config("no tool configured".into())),
        };
        let raw = match raw {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, "source fetch failed");
                report.error = Some(err.to_string());
                return report;
            }
        };

        let records = parse_records(&raw, source.response_key.as_deref());
        report.fetched = records.len();
        debug!(fetched = report.fetched, "records fetched");

        let mut current_ids = Vec::with_capacity(records.len());
        for record in records {
            let Some(Transformed {
                mut item,
                id_complete,
            }) = transform_record(record, source)
            else {
                continue;
            };
            let Some(id) = item.id() else {
                continue;
            };
            if !id_complete {
                debug!(item_id = %id, "identifier partially unresolved, skipping");
                report.unresolved += 1;
                continue;
            }
            current_ids.push(id.clone());

            let rules = source.readiness.as_ref();
            if let Some(rules) = rules.filter(|rules| rules.require_attention) {
                annotate_attention(&mut item, &rules.bot_accounts);
            }
            if !ReadinessEvaluator::check(&item, rules).ready {
                continue;
            }
            report.ready += 1;

            match self.should_dispatch(&item, &id) {
                Ok(true) => {}
                Ok(false) => {
                    report.already_processed += 1;
                    continue;
                }
                Err(err) => {
                    warn!(item_id = %id, %err, "ledger unavailable, skipping item");
                    report.failed += 1;
                    continue;
                }
            }

            self.handle_item(source, &item, &id, &mut report).await;
        }

        if let Some(days) = source.cleanup_missing_after_days {
            match self
                .lock()
                .and_then(|mut ledger| ledger.cleanup_missing_from_source(&source.name, &current_ids, days))
            {
                Ok(removed) => report.cleaned = removed,
                Err(err) => warn!(%err, "missing-item cleanup failed"),
            }
        }

        report
    }

    /// Unseen items, and seen items that changed meaningfully, are dispatched.
    fn should_dispatch(&self, item: &Item, id: &str) -> Result<bool> {
        let ledger = self.lock()?;
        Ok(!ledger.is_processed(id) || ledger.should_reprocess(item))
    }

    async fn handle_item(&self, source: &SourceConfig, item: &Item, id: &str, report: &mut SourceReport) {
        let repo = self.resolve_repo(source, item);
        let action = ActionConfig::resolve(&source.action, repo, &self.config.defaults);

        let message = match self.prompts.load(&action.prompt) {
            Ok(prompt) => template::render(&prompt, item),
            Err(err) => {
                report.failed += 1;
                self.notifier.notify(&Notification::Failed {
                    source: source.name.clone(),
                    item_id: id.to_owned(),
                    reason: err.to_string(),
                });
                return;
            }
        };

        let outcome = self.dispatcher.dispatch(item, &action, &message).await;
        let notification = match outcome {
            DispatchOutcome::Dispatched {
                session_id,
                directory,
                reused,
                warning,
                ..
            } => {
                report.dispatched += 1;
                let meta = ProcessedMeta {
                    source: source.name.clone(),
                    item_state: item.state(),
                    item_updated_at: item.updated_at(),
                };
                if let Err(err) = self.lock().and_then(|mut ledger| ledger.mark_processed(id, meta)) {
                    warn!(item_id = %id, %err, "failed to record processed item");
                }
                Notification::Dispatched {
                    source: source.name.clone(),
                    item_id: id.to_owned(),
                    session_id,
                    directory,
                    reused,
                    warning,
                }
            }
            DispatchOutcome::Skipped { reason } => {
                report.skipped += 1;
                Notification::Skipped {
                    source: source.name.clone(),
                    item_id: id.to_owned(),
                    reason,
                }
            }
            DispatchOutcome::Failed { reason } => {
                report.failed += 1;
                Notification::Failed {
                    source: source.name.clone(),
                    item_id: id.to_owned(),
                    reason,
                }
            }
        };
        self.notifier.notify(&notification);
    }

    /// Expand the source's repo template to a `[repos]` entry.
    fn resolve_repo(&self, source: &SourceConfig, item: &Item) -> Option<&RepoConfig> {
        let key = template::render_strict(source.repo.as_deref()?, item)?;
        let repo = self.config.repos.get(key.trim());
        if repo.is_none() {
            debug!(repo = %key, "no repo configuration for item");
        }
        repo
    }

    fn lock(&self) -> Result<MutexGuard<'_, Poller>> {
        self.ledger
            .lock()
            .map_err(|_| AppError::Ledger("ledger mutex poisoned".into()))
    }
}
