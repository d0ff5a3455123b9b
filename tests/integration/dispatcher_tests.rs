//! Dispatcher behaviour against an in-memory session server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_relay::dispatch::{DispatchOutcome, Dispatcher};
use agent_relay::models::action::{ActionConfig, ActionOverrides, WorkspacePolicy};
use agent_relay::models::session::SessionActivity;
use serde_json::json;

use super::test_helpers::{action_in, item, project, session, FakeServer};

const SERVER: &str = "http://127.0.0.1:4096";

fn dispatcher(server: &Arc<FakeServer>) -> Dispatcher {
    Dispatcher::new(server.clone(), Arc::new(|_: &Path| Some(SERVER.to_owned())))
}

#[tokio::test]
async fn reuses_idle_session_instead_of_creating() {
    let server = Arc::new(FakeServer {
        sessions: vec![session("idle-1", "/src/app", 100), session("busy-1", "/src/app", 900)],
        statuses: [("busy-1".to_owned(), SessionActivity::Busy)].into(),
        ..FakeServer::default()
    });

    let outcome = dispatcher(&server)
        .dispatch(&item(json!({ "id": "i1" })), &action_in(Path::new("/src/app")), "do it")
        .await;

    match outcome {
        DispatchOutcome::Dispatched { session_id, reused, warning, .. } => {
            assert_eq!(session_id, "idle-1");
            assert!(reused);
            assert!(warning.is_none());
        }
        other => panic!("expected dispatch, got {other:?}"),
    }
    assert!(server.created_sessions().is_empty(), "no session created");
    let posted = server.posted();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].session_id, "idle-1");
    assert_eq!(posted[0].message.parts[0].text, "do it");
}

#[tokio::test]
async fn creates_session_when_none_exist() {
    let server = Arc::new(FakeServer::default());
    let mut action = action_in(Path::new("/src/app"));
    action.session_name = Some("#{number}: {title}".into());
    action.agent = Some("build".into());
    action.model = Some("anthropic/sonnet".into());

    let outcome = dispatcher(&server)
        .dispatch(
            &item(json!({ "id": "i2", "number": 7, "title": "Flaky test" })),
            &action,
            "prompt",
        )
        .await;

    assert_eq!(
        outcome,
        DispatchOutcome::Dispatched {
            session_id: "new-1".into(),
            directory: PathBuf::from("/src/app"),
            server: SERVER.into(),
            reused: false,
            warning: None,
        }
    );
    assert_eq!(server.created_sessions(), vec!["/src/app".to_owned()]);
    assert_eq!(
        server.titles.lock().expect("lock").clone(),
        vec![("new-1".to_owned(), "#7: Flaky test".to_owned())]
    );
    let message = &server.posted()[0].message;
    assert_eq!(message.agent.as_deref(), Some("build"));
    assert_eq!(message.model.as_ref().map(|m| m.model_id.as_str()), Some("sonnet"));
}

#[tokio::test]
async fn reuse_disabled_always_creates() {
    let server = Arc::new(FakeServer {
        sessions: vec![session("idle-1", "/src/app", 100)],
        ..FakeServer::default()
    });
    let mut action = action_in(Path::new("/src/app"));
    action.reuse_session = false;

    let outcome = dispatcher(&server)
        .dispatch(&item(json!({ "id": "i3" })), &action, "x")
        .await;

    assert!(matches!(outcome, DispatchOutcome::Dispatched { reused: false, .. }));
    assert_eq!(server.created_sessions().len(), 1);
}

#[tokio::test]
async fn archived_sessions_are_not_reused() {
    let mut archived = session("old", "/src/app", 100);
    archived.time.archived = Some(json!(1_700_000_000_000_i64));
    let server = Arc::new(FakeServer {
        sessions: vec![archived],
        ..FakeServer::default()
    });

    let outcome = dispatcher(&server)
        .dispatch(&item(json!({ "id": "i" })), &action_in(Path::new("/src/app")), "x")
        .await;

    assert!(matches!(outcome, DispatchOutcome::Dispatched { reused: false, .. }));
}

#[tokio::test]
async fn missing_directory_is_skipped_not_failed() {
    let server = Arc::new(FakeServer::default());
    let action = ActionConfig::resolve(
        &ActionOverrides::default(),
        None,
        &ActionOverrides::default(),
    );

    let outcome = dispatcher(&server)
        .dispatch(&item(json!({ "id": "i4" })), &action, "x")
        .await;

    assert!(matches!(outcome, DispatchOutcome::Skipped { .. }));
    assert!(server.posted().is_empty());
}

#[tokio::test]
async fn partially_resolved_directory_is_skipped() {
    let server = Arc::new(FakeServer::default());
    let action = ActionConfig::resolve(
        &ActionOverrides {
            working_dir: Some("/src/{repo.name}".into()),
            ..ActionOverrides::default()
        },
        None,
        &ActionOverrides::default(),
    );

    let outcome = dispatcher(&server)
        .dispatch(&item(json!({ "id": "i5" })), &action, "x")
        .await;

    assert!(matches!(outcome, DispatchOutcome::Skipped { .. }));
}

#[tokio::test]
async fn no_server_is_failure() {
    let server = Arc::new(FakeServer::default());
    let dispatcher = Dispatcher::new(server.clone(), Arc::new(|_: &Path| None::<String>));

    let outcome = dispatcher
        .dispatch(&item(json!({ "id": "i6" })), &action_in(Path::new("/src/app")), "x")
        .await;

    match outcome {
        DispatchOutcome::Failed { reason } => assert!(reason.contains("no server")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn post_failure_after_create_is_partial_success() {
    let server = Arc::new(FakeServer {
        fail_post: true,
        ..FakeServer::default()
    });

    let outcome = dispatcher(&server)
        .dispatch(&item(json!({ "id": "i7" })), &action_in(Path::new("/src/app")), "x")
        .await;

    match outcome {
        DispatchOutcome::Dispatched { session_id, warning, reused, .. } => {
            assert_eq!(session_id, "new-1");
            assert!(!reused);
            assert!(warning.expect("warning").contains("not delivered"));
        }
        other => panic!("expected partial success, got {other:?}"),
    }
}

#[tokio::test]
async fn post_failure_to_reused_session_is_failure() {
    let server = Arc::new(FakeServer {
        sessions: vec![session("idle-1", "/src/app", 1)],
        fail_post: true,
        ..FakeServer::default()
    });

    let outcome = dispatcher(&server)
        .dispatch(&item(json!({ "id": "i8" })), &action_in(Path::new("/src/app")), "x")
        .await;

    assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
}

#[tokio::test]
async fn create_failure_is_failure() {
    let server = Arc::new(FakeServer {
        fail_create_session: true,
        ..FakeServer::default()
    });

    let outcome = dispatcher(&server)
        .dispatch(&item(json!({ "id": "i9" })), &action_in(Path::new("/src/app")), "x")
        .await;

    assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
}

#[tokio::test]
async fn new_workspace_policy_creates_named_worktree() {
    let server = Arc::new(FakeServer::default());
    let mut action = action_in(Path::new("/src/app"));
    action.workspace = Some(WorkspacePolicy::New);
    action.worktree_name = Some("issue-{number} {title}".into());

    let outcome = dispatcher(&server)
        .dispatch(
            &item(json!({ "id": "i10", "number": 5, "title": "Fix login" })),
            &action,
            "x",
        )
        .await;

    assert_eq!(
        server.created_worktrees(),
        vec![Some("issue-5-Fix-login".to_owned())]
    );
    match outcome {
        DispatchOutcome::Dispatched { directory, .. } => {
            assert_eq!(directory, PathBuf::from("/src/app-wt/issue-5-Fix-login"));
        }
        other => panic!("expected dispatch, got {other:?}"),
    }
}

#[tokio::test]
async fn worktree_failure_falls_back_to_plain_directory() {
    let server = Arc::new(FakeServer {
        fail_worktree: true,
        ..FakeServer::default()
    });
    let mut action = action_in(Path::new("/src/app"));
    action.workspace = Some(WorkspacePolicy::New);

    let outcome = dispatcher(&server)
        .dispatch(&item(json!({ "id": "i11" })), &action, "x")
        .await;

    assert!(matches!(
        outcome,
        DispatchOutcome::Dispatched { ref directory, .. } if directory == Path::new("/src/app")
    ));
}

#[tokio::test]
async fn named_workspace_is_found_by_suffix() {
    let server = Arc::new(FakeServer {
        worktrees: vec!["/src/app-wt/alpha".into(), "/src/app-wt/beta".into()],
        ..FakeServer::default()
    });
    let mut action = action_in(Path::new("/src/app"));
    action.workspace = Some(WorkspacePolicy::Named("beta".into()));

    let outcome = dispatcher(&server)
        .dispatch(&item(json!({ "id": "i12" })), &action, "x")
        .await;

    assert!(matches!(
        outcome,
        DispatchOutcome::Dispatched { ref directory, .. } if directory == Path::new("/src/app-wt/beta")
    ));
    assert!(server.created_worktrees().is_empty(), "named workspaces are never created");
}

#[tokio::test]
async fn missing_named_workspace_uses_plain_directory() {
    let server = Arc::new(FakeServer::default());
    let mut action = action_in(Path::new("/src/app"));
    action.workspace = Some(WorkspacePolicy::Named("gamma".into()));

    let outcome = dispatcher(&server)
        .dispatch(&item(json!({ "id": "i13" })), &action, "x")
        .await;

    assert!(matches!(
        outcome,
        DispatchOutcome::Dispatched { ref directory, .. } if directory == Path::new("/src/app")
    ));
    assert!(server.created_worktrees().is_empty());
}

#[tokio::test]
async fn auto_detect_creates_worktree_for_sandboxed_projects() {
    let server = Arc::new(FakeServer {
        projects: vec![project("p", "/src/app", &["/src/app-wt/existing"])],
        ..FakeServer::default()
    });
    let mut action = action_in(Path::new("/src/app"));
    action.workspace = None;

    dispatcher(&server)
        .dispatch(&item(json!({ "id": "i14" })), &action, "x")
        .await;

    assert_eq!(server.created_worktrees().len(), 1);
}

#[tokio::test]
async fn auto_detect_uses_plain_directory_without_sandboxes() {
    let server = Arc::new(FakeServer {
        projects: vec![project("p", "/src/app", &[])],
        ..FakeServer::default()
    });
    let mut action = action_in(Path::new("/src/app"));
    action.workspace = None;

    let outcome = dispatcher(&server)
        .dispatch(&item(json!({ "id": "i15" })), &action, "x")
        .await;

    assert!(server.created_worktrees().is_empty());
    assert!(matches!(
        outcome,
        DispatchOutcome::Dispatched { ref directory, .. } if directory == Path::new("/src/app")
    ));
}
