//! evchain: command-line collaborator for the tamper-evident telemetry log.
//!
//! Every command prints JSON on stdout (except `diff` without `--json`). On
//! failure the error code and message go to stderr and the exit code is 1.
//!
//! Usage:
//!   evchain record --event-type plan.generated --actor-kind human --actor-id human:jordan
//!   evchain verify
//!   evchain purge --older-than 30d
//!   evchain export --range 7d --actor-id human:jordan --out summary.json
//!   evchain snapshot --range 7d --out baseline.json
//!   evchain diff baseline-a.json baseline-b.json

use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use evchain_aggregate::{diff, load_summary, render_text, write_summary, Aggregator};
use evchain_contracts::{
    build_info::BuildInfo,
    error::{EvchainError, EvchainResult},
    event::{ActorKind, ActorRef, RawEvent, TELEMETRY_PURGED},
    window::{parse_window, ExportRange, RetentionWindow},
};
use evchain_core::config::EvchainConfig;
use evchain_core::traits::EventLog;
use evchain_store::EventStore;

const CONFIG_FILE_NAME: &str = "evchain.toml";

// ── CLI definition ────────────────────────────────────────────────────────────

/// Tamper-evident, append-only telemetry log.
#[derive(Parser)]
#[command(
    name = "evchain",
    version,
    about = "Tamper-evident, hash-chained telemetry log",
    long_about = "Records sanitized events into a SHA-256 hash-chained JSONL store,\n\
                  verifies the chain, applies retention, and exports aggregate summaries."
)]
struct Cli {
    /// Store directory (default: $EVCHAIN_HOME, else ~/.evchain/telemetry).
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Configuration file (default: <dir>/evchain.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sanitize, hash, and append one event.
    Record {
        #[arg(long)]
        event_type: String,
        #[arg(long, value_parser = parse_actor_kind, default_value = "human")]
        actor_kind: ActorKind,
        #[arg(long)]
        actor_id: Option<String>,
        #[arg(long, default_value = "cli")]
        source: String,
        #[arg(long)]
        trace_id: Option<String>,
        /// Event payload as JSON.
        #[arg(long, default_value = "{}")]
        data: String,
        /// Event timestamp (RFC 3339); defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Check every row's linkage and hash.
    Verify,
    /// Archive rows older than a window and re-anchor the chain.
    Purge {
        /// Window such as 30d or 12h (default: events.retention_days).
        #[arg(long)]
        older_than: Option<String>,
    },
    /// Archive the whole store and start a fresh chain.
    Rotate,
    /// Aggregate summary of a trailing window.
    Export {
        #[arg(long, default_value = "7d")]
        range: String,
        #[arg(long)]
        actor_id: Option<String>,
        /// Also write the canonical summary to this file.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export plus a deterministic digest, written to a file.
    Snapshot {
        #[arg(long, default_value = "7d")]
        range: String,
        #[arg(long)]
        actor_id: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Compare two summary files (b - a).
    Diff {
        a: PathBuf,
        b: PathBuf,
        /// Print the delta report as JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Store location, row count, and tail hash.
    Status,
}

fn parse_actor_kind(value: &str) -> Result<ActorKind, String> {
    ActorKind::parse(value).ok_or_else(|| format!("actor kind must be human, agent, or system, not '{}'", value))
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(Output::Json(value)) => match serde_json::to_string_pretty(&value) {
            Ok(text) => println!("{}", text),
            Err(e) => fail(&EvchainError::from(e)),
        },
        Ok(Output::Text(text)) => println!("{}", text),
        Ok(Output::Failed(value)) => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
            std::process::exit(1);
        }
        Err(e) => fail(&e),
    }
}

fn fail(err: &EvchainError) -> ! {
    eprintln!("{}: {}", err.code(), err);
    std::process::exit(1);
}

enum Output {
    Json(Value),
    Text(String),
    /// Printed like `Json`, but the process exits with status 1.
    Failed(Value),
}

// ── Command dispatch ──────────────────────────────────────────────────────────

fn run(cli: Cli) -> EvchainResult<Output> {
    let Cli { dir, config, command } = cli;
    match command {
        // Diff only reads summary files; it needs no store.
        Command::Diff { a, b, json } => run_diff(&a, &b, json),
        command => {
            let dir = resolve_dir(dir)?;
            let config = load_config(&dir, config.as_deref())?;
            let store = EventStore::open(&dir, config)?;
            run_with_store(&store, command)
        }
    }
}

fn run_with_store(store: &EventStore, command: Command) -> EvchainResult<Output> {
    match command {
        Command::Record {
            event_type,
            actor_kind,
            actor_id,
            source,
            trace_id,
            data,
            at,
        } => {
            let data: Value = serde_json::from_str(&data).map_err(|e| EvchainError::ConfigError {
                reason: format!("--data is not valid JSON: {}", e),
            })?;
            let mut raw = RawEvent::new(
                event_type,
                ActorRef {
                    kind: actor_kind,
                    id: actor_id,
                },
                source,
            )
            .with_data(data)
            .with_build(BuildInfo::current("evchain", env!("CARGO_PKG_VERSION")).to_map());
            if let Some(trace_id) = trace_id {
                raw = raw.with_trace_id(trace_id);
            }
            if let Some(at) = at {
                raw = raw.at(at);
            }
            let row = store.record(raw)?;
            Ok(Output::Json(serde_json::to_value(row)?))
        }
        Command::Verify => {
            let report = store.verify()?;
            let value = serde_json::to_value(&report)?;
            Ok(if report.ok {
                Output::Json(value)
            } else {
                Output::Failed(value)
            })
        }
        Command::Purge { older_than } => run_purge(store, older_than),
        Command::Rotate => Ok(Output::Json(serde_json::to_value(store.rotate()?)?)),
        Command::Export { range, actor_id, out } => {
            let range = trailing_range(&range)?;
            let summary = Aggregator::new(store).export(range, actor_id.as_deref())?;
            if let Some(out) = out {
                write_summary(&summary, &out)?;
            }
            Ok(Output::Json(serde_json::to_value(summary)?))
        }
        Command::Snapshot { range, actor_id, out } => {
            let range = trailing_range(&range)?;
            let snapshot = Aggregator::new(store).snapshot(range, actor_id.as_deref())?;
            snapshot.write_to(&out)?;
            Ok(Output::Json(json!({
                "path": out,
                "sha256": snapshot.sha256,
                "events_considered": snapshot.summary.events_considered,
            })))
        }
        Command::Status => {
            let status = store.status()?;
            let tail = store.tail()?;
            Ok(Output::Json(json!({
                "path": status.path,
                "row_count": status.row_count,
                "tail_event_hash": tail.map(|row| row.event_hash),
                "tail_defect": status.tail_defect,
            })))
        }
        Command::Diff { a, b, json } => run_diff(&a, &b, json),
    }
}

fn run_purge(store: &EventStore, older_than: Option<String>) -> EvchainResult<Output> {
    let window_text = older_than.unwrap_or_else(|| format!("{}d", store.config().events.retention_days));
    let window: RetentionWindow = window_text.parse()?;
    let report = store.purge(window)?;

    let marker = RawEvent::new(
        TELEMETRY_PURGED,
        ActorRef::new(ActorKind::System, "system:retention"),
        "cli",
    )
    .with_data(json!({
        "target": "telemetry",
        "window": window_text,
        "purged_count": report.archived,
        "kept_count": report.kept,
        // File name only; the store directory is deployment detail.
        "archive_file": report
            .archive_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned()),
        "archive_sha256": report.archive_sha256,
    }));
    store.record(marker)?;

    Ok(Output::Json(serde_json::to_value(report)?))
}

fn run_diff(a: &Path, b: &Path, as_json: bool) -> EvchainResult<Output> {
    let before = load_summary(a)?;
    let after = load_summary(b)?;
    let report = diff(&before, &after);
    if as_json {
        Ok(Output::Json(serde_json::to_value(report)?))
    } else {
        Ok(Output::Text(render_text(&report)))
    }
}

// ── Environment ───────────────────────────────────────────────────────────────

fn trailing_range(range: &str) -> EvchainResult<ExportRange> {
    let window = parse_window(range)?;
    Ok(ExportRange::trailing(window, Utc::now().trunc_subsecs(0)))
}

/// `--dir`, then `$EVCHAIN_HOME`, then `~/.evchain/telemetry`.
fn resolve_dir(flag: Option<PathBuf>) -> EvchainResult<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Some(home) = std::env::var_os("EVCHAIN_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(|home| PathBuf::from(home).join(".evchain").join("telemetry"))
        .ok_or_else(|| EvchainError::ConfigError {
            reason: "no store directory: pass --dir or set EVCHAIN_HOME".to_string(),
        })
}

fn load_config(dir: &Path, flag: Option<&Path>) -> EvchainResult<EvchainConfig> {
    match flag {
        Some(path) => EvchainConfig::from_file(path),
        None => {
            let default_path = dir.join(CONFIG_FILE_NAME);
            if default_path.is_file() {
                EvchainConfig::from_file(&default_path)
            } else {
                debug!(dir = %dir.display(), "no config file, using defaults");
                Ok(EvchainConfig::default())
            }
        }
    }
}
