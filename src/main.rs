#![forbid(unsafe_code)]

//! `agent-relay`: poll daemon.
//!
//! Loads configuration, opens the processed-item ledger, starts the expiry
//! task, and runs a poll cycle every `poll_interval_seconds` until SIGINT
//! or SIGTERM.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Parser, ValueEnum};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_relay::config::GlobalConfig;
use agent_relay::engine::Engine;
use agent_relay::poller::{expiry, Poller, SharedPoller};
use agent_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-relay", about = "Dispatch ready work items to agent sessions", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Run a single poll cycle and exit.
    #[arg(long)]
    once: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-relay bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = Arc::new(GlobalConfig::load_from_path(&args.config)?);
    info!(
        sources = config.sources.len(),
        endpoints = config.server.endpoints().len(),
        "configuration loaded"
    );

    // ── Open ledger ─────────────────────────────────────
    let ledger: SharedPoller = Arc::new(Mutex::new(Poller::new(config.ledger_path.clone())?));
    info!(path = %config.ledger_path.display(), "ledger opened");

    let engine = Engine::from_config(Arc::clone(&config), Arc::clone(&ledger))?;

    if args.once {
        if let Err(err) = expiry::purge(&ledger, config.ledger_ttl_days) {
            error!(%err, "ledger expiry failed");
        }
        let report = engine.run_cycle().await;
        info!(
            dispatched = report.dispatched(),
            failed = report.failed(),
            "single cycle finished"
        );
        return Ok(());
    }

    // ── Start expiry service ────────────────────────────
    let ct = CancellationToken::new();
    let expiry_handle = expiry::spawn_expiry_task(Arc::clone(&ledger), config.ledger_ttl_days, ct.clone());

    // ── Poll loop ───────────────────────────────────────
    let mut interval = tokio::time::interval(config.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!(interval_secs = config.poll_interval_seconds, "poll loop started");
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            _ = interval.tick() => {
                engine.run_cycle().await;
            }
        }
    }

    ct.cancel();
    if let Err(err) = expiry_handle.await {
        error!(%err, "expiry task ended abnormally");
    }
    info!("agent-relay shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
