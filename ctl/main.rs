#![forbid(unsafe_code)]

//! `agent-relay-ctl`: ledger maintenance companion for `agent-relay`.
//!
//! Opens the processed-item ledger directly (by path, or via the daemon's
//! config file) and lists, counts, clears, or expires records. Changes
//! take effect on the daemon's next restart; a running daemon keeps its
//! own copy and overwrites the file on its next write.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use agent_relay::config::GlobalConfig;
use agent_relay::poller::ledger::DEFAULT_TTL_DAYS;
use agent_relay::poller::Poller;
use agent_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "agent-relay-ctl",
    about = "Inspect and edit the agent-relay processed-item ledger",
    version,
    long_about = None
)]
struct Cli {
    /// Ledger file to operate on.
    #[arg(long, conflicts_with = "config")]
    ledger: Option<PathBuf>,

    /// Daemon config file; its `ledger_path` and `ledger_ttl_days` are used.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List processed items.
    List {
        /// Only show items from this source.
        #[arg(long)]
        source: Option<String>,
    },

    /// Count processed items.
    Count {
        /// Only count items from this source.
        #[arg(long)]
        source: Option<String>,
    },

    /// Forget one item so it is dispatched again.
    Clear {
        /// Item identifier.
        id: String,
    },

    /// Forget every item from a source.
    ClearSource {
        /// Source name.
        source: String,
    },

    /// Forget every item.
    Reset,

    /// Remove records older than the TTL.
    Expire {
        /// Age in days; defaults to the config's `ledger_ttl_days`.
        #[arg(long)]
        ttl_days: Option<u32>,
    },
}

fn main() {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format).and_then(|()| run(args)) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(args: Cli) -> Result<()> {
    let (ledger_path, default_ttl) = match (&args.ledger, &args.config) {
        (Some(path), _) => (path.clone(), DEFAULT_TTL_DAYS),
        (None, Some(config)) => {
            let config = GlobalConfig::load_from_path(config)?;
            (config.ledger_path, config.ledger_ttl_days)
        }
        (None, None) => {
            return Err(AppError::Config(
                "either --ledger or --config is required".into(),
            ))
        }
    };
    let mut ledger = Poller::new(ledger_path)?;

    match args.command {
        Command::List { source } => {
            let rows = ledger
                .records()
                .iter()
                .filter(|(_, record)| source.as_deref().is_none_or(|source| record.source == source));
            for (id, record) in rows {
                println!(
                    "{id}\t{}\t{}\t{}",
                    record.source,
                    record.processed_at.to_rfc3339(),
                    record.item_state.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Count { source } => {
            println!("{}", ledger.processed_count(source.as_deref()));
        }
        Command::Clear { id } => {
            if !ledger.clear_processed(&id)? {
                return Err(AppError::NotFound(format!("no processed item `{id}`")));
            }
            println!("cleared {id}");
        }
        Command::ClearSource { source } => {
            let removed = ledger.clear_by_source(&source)?;
            println!("cleared {removed} item(s) from {source}");
        }
        Command::Reset => {
            let count = ledger.processed_count(None);
            ledger.clear_state()?;
            println!("cleared {count} item(s)");
        }
        Command::Expire { ttl_days } => {
            let ttl_days = ttl_days.unwrap_or(default_ttl);
            let removed = ledger.cleanup_expired(ttl_days)?;
            println!("expired {removed} item(s) older than {ttl_days} day(s)");
        }
    }

    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

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
