//! Full poll cycles with a fake tool invoker and session server.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use serde_json::json;

use agent_relay::config::GlobalConfig;
use agent_relay::dispatch::Dispatcher;
use agent_relay::engine::Engine;
use agent_relay::models::ledger::ProcessedMeta;
use agent_relay::models::source::ToolDescriptor;
use agent_relay::notify::{Notification, Notifier};
use agent_relay::poller::{Poller, SharedPoller};
use agent_relay::tools::ToolInvoker;
use agent_relay::{AppError, Result};

use super::test_helpers::FakeServer;

/// Returns canned output per source; sources without output fail.
struct CannedTools(Mutex<HashMap<String, String>>);

impl CannedTools {
    fn new(outputs: &[(&str, serde_json::Value)]) -> Self {
        Self(Mutex::new(
            outputs
                .iter()
                .map(|(source, value)| ((*source).to_owned(), value.to_string()))
                .collect(),
        ))
    }

    fn set(&self, source: &str, value: &serde_json::Value) {
        self.0
            .lock()
            .expect("lock")
            .insert(source.to_owned(), value.to_string());
    }
}

impl ToolInvoker for CannedTools {
    fn invoke<'a>(
        &'a self,
        source: &'a str,
        _tool: &'a ToolDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        let output = self.0.lock().expect("lock").get(source).cloned();
        Box::pin(async move { output.ok_or_else(|| AppError::Tool(format!("{source} offline"))) })
    }
}

#[derive(Default)]
struct RecordingNotifier(Mutex<Vec<Notification>>);

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.0.lock().expect("lock").push(notification.clone());
    }
}

const CONFIG: &str = r#"
ledger_path = 'LEDGER'
prompts_dir = 'PROMPTS'

[server]
urls = ["http://fake:4096"]

[defaults]
worktree = "none"

[repos."myorg/backend"]
path = "/src/backend"
prompt = "backend"

[[sources]]
name = "issues"
id_template = "gh:{repo}#{number}"
repo = "{repo}"
cleanup_missing_after_days = 1
tool = { command = ["unused"] }

[sources.readiness.labels]
exclude = ["wip"]

[[sources]]
name = "broken"
tool = { command = ["unused"] }

[[sources]]
name = "disabled"
enabled = false
tool = { command = ["unused"] }
"#;

struct Harness {
    _dir: tempfile::TempDir,
    ledger_path: PathBuf,
    ledger: SharedPoller,
    server: Arc<FakeServer>,
    tools: Arc<CannedTools>,
    notes: Arc<RecordingNotifier>,
    engine: Engine,
}

fn harness(server: FakeServer, tools: CannedTools) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let prompts = dir.path().join("prompts");
    std::fs::create_dir_all(&prompts).expect("prompts dir");
    std::fs::write(prompts.join("backend.md"), "Backend task: {title}").expect("prompt");
    let ledger_path = dir.path().join("processed.json");

    let raw = CONFIG
        .replace("LEDGER", ledger_path.to_str().expect("utf8"))
        .replace("PROMPTS", prompts.to_str().expect("utf8"));
    let config = Arc::new(GlobalConfig::from_toml_str(&raw).expect("config"));

    let ledger: SharedPoller =
        Arc::new(Mutex::new(Poller::new(&ledger_path).expect("ledger")));
    let server = Arc::new(server);
    let tools = Arc::new(tools);
    let notes = Arc::new(RecordingNotifier::default());
    let dispatcher = Dispatcher::new(
        server.clone(),
        Arc::new(|_: &Path| Some("http://fake:4096".to_owned())),
    );
    let engine = Engine::new(
        config,
        Arc::clone(&ledger),
        tools.clone(),
        dispatcher,
        notes.clone(),
    );
    Harness {
        _dir: dir,
        ledger_path,
        ledger,
        server,
        tools,
        notes,
        engine,
    }
}

fn issues() -> serde_json::Value {
    json!([
        { "repo": "myorg/backend", "number": 1, "title": "Crash on save", "state": "open" },
        { "repo": "myorg/backend", "number": 2, "title": "Half done", "labels": ["wip"] },
        { "number": 3, "title": "Which repo?" },
        { "repo": "unknown/repo", "number": 4, "title": "Not configured" }
    ])
}

#[tokio::test]
async fn cycle_dispatches_ready_items_once() {
    let h = harness(FakeServer::default(), CannedTools::new(&[("issues", issues())]));

    let report = h.engine.run_cycle().await;
    let issues = report.source("issues").expect("issues report");

    assert_eq!(issues.fetched, 4);
    assert_eq!(issues.unresolved, 1);
    assert_eq!(issues.ready, 2);
    assert_eq!(issues.dispatched, 1);
    assert_eq!(issues.skipped, 1);
    assert_eq!(issues.failed, 0);
    assert!(report.source("disabled").is_none(), "disabled sources do not run");

    let posted = h.server.posted();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].directory, "/src/backend");
    assert_eq!(posted[0].message.parts[0].text, "Backend task: Crash on save");

    let ledger = h.ledger.lock().expect("lock");
    let record = ledger.record("gh:myorg/backend#1").expect("recorded");
    assert_eq!(record.source, "issues");
    assert_eq!(record.item_state.as_deref(), Some("open"));
    assert!(!ledger.is_processed("gh:unknown/repo#4"), "skipped items are not recorded");
    drop(ledger);

    let again = h.engine.run_cycle().await;
    let issues = again.source("issues").expect("issues report");
    assert_eq!(issues.already_processed, 1);
    assert_eq!(issues.dispatched, 0);
    assert_eq!(h.server.posted().len(), 1, "no second message");
}

#[tokio::test]
async fn ledger_survives_restart() {
    let h = harness(FakeServer::default(), CannedTools::new(&[("issues", issues())]));
    h.engine.run_cycle().await;

    let reopened = Poller::new(&h.ledger_path).expect("reload");
    assert!(reopened.is_processed("gh:myorg/backend#1"));
}

#[tokio::test]
async fn reopened_item_is_dispatched_again() {
    let h = harness(FakeServer::default(), CannedTools::new(&[("issues", issues())]));
    h.engine.run_cycle().await;

    h.ledger
        .lock()
        .expect("lock")
        .mark_processed(
            "gh:myorg/backend#1",
            ProcessedMeta {
                source: "issues".into(),
                item_state: Some("closed".into()),
                item_updated_at: None,
            },
        )
        .expect("mark closed");

    let report = h.engine.run_cycle().await;
    assert_eq!(report.source("issues").expect("report").dispatched, 1);
    assert_eq!(h.server.posted().len(), 2);
    assert_eq!(
        h.ledger
            .lock()
            .expect("lock")
            .record("gh:myorg/backend#1")
            .and_then(|r| r.item_state.clone())
            .as_deref(),
        Some("open")
    );
}

#[tokio::test]
async fn fetch_failure_is_reported_and_cycle_continues() {
    let h = harness(FakeServer::default(), CannedTools::new(&[("issues", issues())]));

    let report = h.engine.run_cycle().await;

    let broken = report.source("broken").expect("broken report");
    assert!(broken.error.as_deref().expect("error").contains("offline"));
    assert_eq!(report.source("issues").expect("issues").dispatched, 1);
}

#[tokio::test]
async fn records_missing_from_source_are_cleaned_after_age_floor() {
    let h = harness(FakeServer::default(), CannedTools::new(&[("issues", issues())]));
    {
        let mut ledger = h.ledger.lock().expect("lock");
        ledger
            .mark_processed_at(
                "gh:myorg/backend#99",
                ProcessedMeta::for_source("issues"),
                Utc::now() - Duration::days(3),
            )
            .expect("seed old");
        ledger
            .mark_processed_at(
                "gh:myorg/backend#98",
                ProcessedMeta::for_source("issues"),
                Utc::now() - Duration::hours(1),
            )
            .expect("seed fresh");
    }

    let report = h.engine.run_cycle().await;

    assert_eq!(report.source("issues").expect("report").cleaned, 1);
    let ledger = h.ledger.lock().expect("lock");
    assert!(!ledger.is_processed("gh:myorg/backend#99"));
    assert!(ledger.is_processed("gh:myorg/backend#98"));
}

#[tokio::test]
async fn failed_fetch_does_not_clean_up() {
    let h = harness(FakeServer::default(), CannedTools::new(&[]));
    h.ledger
        .lock()
        .expect("lock")
        .mark_processed_at(
            "gh:myorg/backend#99",
            ProcessedMeta::for_source("issues"),
            Utc::now() - Duration::days(3),
        )
        .expect("seed");

    let report = h.engine.run_cycle().await;

    assert_eq!(report.source("issues").expect("report").cleaned, 0);
    assert!(h.ledger.lock().expect("lock").is_processed("gh:myorg/backend#99"));
}

#[tokio::test]
async fn failed_dispatch_is_retried_next_cycle() {
    let h = harness(
        FakeServer {
            fail_create_session: true,
            ..FakeServer::default()
        },
        CannedTools::new(&[("issues", issues())]),
    );

    let report = h.engine.run_cycle().await;
    assert_eq!(report.source("issues").expect("report").failed, 1);
    assert!(!h.ledger.lock().expect("lock").is_processed("gh:myorg/backend#1"));

    let again = h.engine.run_cycle().await;
    assert_eq!(again.source("issues").expect("report").failed, 1);
}

#[tokio::test]
async fn notifications_cover_every_outcome() {
    let h = harness(FakeServer::default(), CannedTools::new(&[("issues", issues())]));
    h.engine.run_cycle().await;

    let notes = h.notes.0.lock().expect("lock").clone();
    assert!(notes.iter().any(|n| matches!(
        n,
        Notification::Dispatched { item_id, .. } if item_id == "gh:myorg/backend#1"
    )));
    assert!(notes.iter().any(|n| matches!(
        n,
        Notification::Skipped { item_id, .. } if item_id == "gh:unknown/repo#4"
    )));
}

#[tokio::test]
async fn new_items_in_later_fetch_are_picked_up() {
    let h = harness(FakeServer::default(), CannedTools::new(&[("issues", json!([]))]));
    assert_eq!(h.engine.run_cycle().await.source("issues").expect("report").fetched, 0);

    h.tools.set(
        "issues",
        &json!({ "repo": "myorg/backend", "number": 7, "title": "Single object" }),
    );
    let report = h.engine.run_cycle().await;
    assert_eq!(report.source("issues").expect("report").dispatched, 1);
}

#[tokio::test]
async fn braces_in_resolved_identifier_do_not_block_dispatch() {
    let h = harness(
        FakeServer::default(),
        CannedTools::new(&[(
            "issues",
            json!([{ "repo": "myorg/backend", "number": "{7}", "title": "Braced" }]),
        )]),
    );

    let report = h.engine.run_cycle().await;
    let issues = report.source("issues").expect("report");

    assert_eq!(issues.unresolved, 0);
    assert_eq!(issues.dispatched, 1);
    assert!(h.ledger.lock().expect("lock").is_processed("gh:myorg/backend#{7}"));
}
