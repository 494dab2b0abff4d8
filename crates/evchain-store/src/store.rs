//! `EventStore`: the on-disk, append-only, hash-chained event log.
//!
//! Layout inside the store directory:
//!
//! ```text
//! <dir>/events.jsonl        active store, one canonical JSON row per line
//! <dir>/events.jsonl.lock   flock target serializing every mutation
//! <dir>/archive/            purge and rotation archives
//! ```
//!
//! Appends re-read the tail under the lock, so the chain stays linear no
//! matter how many processes write to the same directory.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use evchain_contracts::{
    error::{EvchainError, EvchainResult},
    event::{Event, RawEvent, StoredRow},
    report::{PurgeReport, StoreStatus, VerificationReport},
    window::RetentionWindow,
};
use evchain_core::canonical::canonical_string;
use evchain_core::config::EvchainConfig;
use evchain_core::traits::EventLog;
use evchain_sanitize::Sanitizer;

use crate::chain::{self, ParsedLine};
use crate::intake;
use crate::lock::StoreLock;
use crate::scan::{self, TailLine, TailMode};

/// A tamper-evident event log rooted at one directory.
///
/// Cheap to open; holds no file handles between calls. Each instance (or
/// process) contends for the same lock file, so several may share a directory.
#[derive(Debug)]
pub struct EventStore {
    pub(crate) dir: PathBuf,
    pub(crate) events_path: PathBuf,
    pub(crate) archive_dir: PathBuf,
    pub(crate) lock: StoreLock,
    pub(crate) config: EvchainConfig,
    sanitizer: Sanitizer,
}

impl EventStore {
    /// Open (creating the directory if needed) a store at `dir`.
    pub fn open(dir: impl Into<PathBuf>, config: EvchainConfig) -> EvchainResult<Self> {
        config.validate()?;
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| EvchainError::io(format!("creating store directory {}", dir.display()), e))?;

        let events_path = dir.join(&config.store.events_file);
        let lock_path = dir.join(format!("{}.lock", config.store.events_file));
        let archive_dir = dir.join(&config.store.archive_dir);
        let lock = StoreLock::new(lock_path, &config.store);
        let sanitizer = Sanitizer::new(config.sanitizer.clone())?;

        debug!(path = %events_path.display(), "event store opened");
        Ok(Self {
            dir,
            events_path,
            archive_dir,
            lock,
            config,
            sanitizer,
        })
    }

    /// Open with the default configuration.
    pub fn open_default(dir: impl Into<PathBuf>) -> EvchainResult<Self> {
        Self::open(dir, EvchainConfig::default())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn config(&self) -> &EvchainConfig {
        &self.config
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    /// Record several events under one lock acquisition, in order.
    ///
    /// Returns every row written, companions included.
    pub fn record_all(&self, events: Vec<RawEvent>) -> EvchainResult<Vec<StoredRow>> {
        let prepared: Vec<Event> = events
            .into_iter()
            .flat_map(|raw| intake::prepare(raw, &self.sanitizer, &self.config.events).into_events())
            .collect();
        self.append_events(prepared)
    }

    /// Every complete row that parses as a stored row, in file order.
    ///
    /// Rows that do not parse are skipped; `verify` reports them.
    pub fn rows(&self) -> EvchainResult<Vec<StoredRow>> {
        let scan = scan::scan_file(&self.events_path)?;
        let mut rows = Vec::with_capacity(scan.lines.len());
        for (row_index, parsed) in scan.parsed().into_iter().enumerate() {
            let map = match parsed {
                ParsedLine::Object(map) => map,
                ParsedLine::Malformed(_) => {
                    warn!(row_index, "skipping malformed row");
                    continue;
                }
            };
            match serde_json::from_value::<StoredRow>(Value::Object(map)) {
                Ok(row) => rows.push(row),
                Err(e) => warn!(row_index, error = %e, "skipping row with an unexpected shape"),
            }
        }
        Ok(rows)
    }

    /// Path and complete-row count of the active store.
    pub fn status(&self) -> EvchainResult<StoreStatus> {
        let scan = scan::scan_file(&self.events_path)?;
        let tail_defect = self.inspect_tail(TailMode::Strict)?.err().map(str::to_string);
        Ok(StoreStatus {
            path: self.events_path.clone(),
            row_count: scan.lines.len(),
            tail_defect,
        })
    }

    /// Archive files in name order (oldest first, given the timestamped names).
    pub fn archive_files(&self) -> EvchainResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.archive_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(EvchainError::io(
                    format!("listing {}", self.archive_dir.display()),
                    e,
                ))
            }
        };
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| EvchainError::io(format!("listing {}", self.archive_dir.display()), e))?
                .path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "jsonl") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn append_events(&self, events: Vec<Event>) -> EvchainResult<Vec<StoredRow>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.lock.acquire()?;
        let mut prior = self.anchor_tail()?;
        let mut rows = Vec::with_capacity(events.len());
        for event in events {
            let row = chain::next_row(prior.as_ref(), event)?;
            prior = Some(row.clone());
            rows.push(row);
        }
        self.append_rows(&rows)?;

        for row in &rows {
            info!(
                event_type = %row.event.event_type,
                event_id = %row.event.event_id,
                event_hash = %row.event_hash,
                "event recorded"
            );
        }
        Ok(rows)
    }

    /// The row a new append links to. Must be called with the lock held.
    fn anchor_tail(&self) -> EvchainResult<Option<StoredRow>> {
        self.inspect_tail(TailMode::Strict)?.map_err(|reason| {
            warn!(path = %self.events_path.display(), reason, "refusing to append to a broken chain");
            EvchainError::ChainBroken {
                reason: reason.to_string(),
            }
        })
    }

    /// The last row, or the reason it cannot anchor a chain.
    fn inspect_tail(&self, mode: TailMode) -> EvchainResult<Result<Option<StoredRow>, &'static str>> {
        Ok(match scan::read_tail_line(&self.events_path, mode)? {
            TailLine::Empty => Ok(None),
            TailLine::Unterminated => Err("unterminated_tail"),
            TailLine::NotUtf8 => Err("invalid_utf8_line"),
            TailLine::Complete(line) => chain::check_tail(&line).map(Some).map_err(|d| d.reason()),
        })
    }

    /// One `write_all` per batch with the file opened in append mode.
    fn append_rows(&self, rows: &[StoredRow]) -> EvchainResult<()> {
        let mut buf = String::new();
        for row in rows {
            buf.push_str(&row_line(row)?);
            buf.push('\n');
        }

        let io_err = |e| EvchainError::io(format!("appending to {}", self.events_path.display()), e);
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.events_path).map_err(io_err)?;
        file.write_all(buf.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;

        if self.config.store.fsync {
            if let Err(e) = file.sync_data() {
                warn!(path = %self.events_path.display(), error = %e, "fsync after append failed");
            }
        }
        Ok(())
    }
}

impl EventLog for EventStore {
    fn record(&self, event: RawEvent) -> EvchainResult<StoredRow> {
        let prepared = intake::prepare(event, &self.sanitizer, &self.config.events);
        if prepared.companion.is_some() {
            debug!(
                redacted = prepared.stats.redacted,
                truncated = prepared.stats.truncated,
                "payload altered by sanitizer, adding risk flag"
            );
        }
        let rows = self.append_events(prepared.into_events())?;
        rows.into_iter().next().ok_or_else(|| EvchainError::Io {
            operation: "recording event".to_string(),
            reason: "no row was written".to_string(),
        })
    }

    fn tail(&self) -> EvchainResult<Option<StoredRow>> {
        match self.inspect_tail(TailMode::SkipPartial)? {
            Ok(row) => Ok(row),
            Err(reason) => {
                warn!(path = %self.events_path.display(), reason, "last row is not a valid chain row");
                Ok(None)
            }
        }
    }

    fn verify(&self) -> EvchainResult<VerificationReport> {
        let scan = scan::scan_file(&self.events_path)?;
        let report = chain::verify_chain(&scan.parsed());
        if report.ok {
            debug!(checked_rows = report.checked_rows, "chain verified");
        } else {
            warn!(
                checked_rows = report.checked_rows,
                violations = report.violations.len(),
                "chain verification found violations"
            );
        }
        Ok(report)
    }

    fn purge(&self, window: RetentionWindow) -> EvchainResult<PurgeReport> {
        self.purge_before(window.cutoff(chrono::Utc::now()))
    }
}

/// The stored text of a row: canonical JSON on a single line.
pub(crate) fn row_line(row: &StoredRow) -> EvchainResult<String> {
    Ok(canonical_string(&serde_json::to_value(row)?))
}

/// Events from any store or archive file, skipping rows that do not parse.
pub fn read_events(path: &Path) -> EvchainResult<Vec<Event>> {
    let scan = scan::scan_file(path)?;
    let mut events = Vec::with_capacity(scan.lines.len());
    let mut skipped = 0usize;
    for parsed in scan.parsed() {
        let event = match parsed {
            ParsedLine::Object(map) => serde_json::from_value::<Event>(Value::Object(map)).ok(),
            ParsedLine::Malformed(_) => None,
        };
        match event {
            Some(event) => events.push(event),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(path = %path.display(), skipped, "skipped unreadable rows");
    }
    Ok(events)
}
