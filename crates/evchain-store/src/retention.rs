//! Windowed retention and full rotation.
//!
//! Both run under the store lock. Archived rows are copied verbatim into a
//! new file under the archive directory; the active store is then replaced
//! atomically (temp file in the same directory, fsync, rename), so a crash
//! leaves either the old or the new store, never a mix.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use evchain_contracts::{
    error::{EvchainError, EvchainResult},
    event::{parse_ts, StoredRow},
    report::PurgeReport,
};
use evchain_core::canonical::{canonical_string, sha256_hex};

use crate::chain::{self, ParsedLine};
use crate::scan;
use crate::store::EventStore;

const PURGE_PREFIX: &str = "events-purged";
const ROTATE_PREFIX: &str = "events-rotated";

impl EventStore {
    /// Archive the leading run of rows with a timestamp before `cutoff`.
    ///
    /// The run ends at the first row that is newer, has no parseable `ts`,
    /// or is malformed. Kept rows are re-anchored: the first one links to
    /// `GENESIS_HASH` and every later one to its new predecessor. Only the
    /// hash fields of kept rows change.
    pub fn purge_before(&self, cutoff: DateTime<Utc>) -> EvchainResult<PurgeReport> {
        let _guard = self.lock.acquire()?;
        let scan = scan::scan_file(&self.events_path)?;
        if scan.unterminated_tail {
            return Err(EvchainError::ChainBroken {
                reason: "unterminated_tail".to_string(),
            });
        }

        let parsed = scan.parsed();
        let expired = parsed
            .iter()
            .take_while(|row| row_timestamp(row).is_some_and(|ts| ts < cutoff))
            .count();
        if expired == 0 {
            info!(kept = parsed.len(), "purge found nothing to archive");
            return Ok(PurgeReport::nothing_archived(parsed.len()));
        }

        let mut active = String::new();
        let mut prev_hash = StoredRow::GENESIS_HASH.to_string();
        for (offset, row) in parsed.into_iter().enumerate().skip(expired) {
            let mut map = match row {
                ParsedLine::Object(map) => map,
                ParsedLine::Malformed(detail) => {
                    return Err(EvchainError::MalformedRow {
                        row_index: offset,
                        detail,
                    })
                }
            };
            prev_hash = chain::relink(&mut map, &prev_hash);
            active.push_str(&canonical_string(&serde_json::Value::Object(map)));
            active.push('\n');
        }
        let kept = scan.lines.len() - expired;

        let mut archived_text = String::new();
        for line in &scan.lines[..expired] {
            // Expired rows all parsed, so they are valid UTF-8.
            if let Ok(text) = line {
                archived_text.push_str(text);
                archived_text.push('\n');
            }
        }

        let (archive_path, archive_sha256) = self.write_archive(PURGE_PREFIX, archived_text.as_bytes())?;
        if let Err(e) = self.replace_active(active.as_bytes()) {
            discard_archive(&archive_path);
            return Err(e);
        }

        info!(
            archived = expired,
            kept,
            archive = %archive_path.display(),
            cutoff = %cutoff,
            "purged expired rows"
        );
        Ok(PurgeReport {
            archived: expired,
            kept,
            archive_path: Some(archive_path),
            archive_sha256: Some(archive_sha256),
        })
    }

    /// Move the whole active store, byte for byte, into a new archive and
    /// leave an empty store behind.
    ///
    /// This is the repair path for a store whose tail cannot anchor appends.
    pub fn rotate(&self) -> EvchainResult<PurgeReport> {
        let _guard = self.lock.acquire()?;
        let bytes = match fs::read(&self.events_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(EvchainError::io(
                    format!("reading {}", self.events_path.display()),
                    e,
                ))
            }
        };
        let archived = bytes
            .split(|&b| b == b'\n')
            .filter(|line| !line.iter().all(|b| b.is_ascii_whitespace()))
            .count();
        if archived == 0 {
            return Ok(PurgeReport::nothing_archived(0));
        }

        let (archive_path, archive_sha256) = self.write_archive(ROTATE_PREFIX, &bytes)?;
        if let Err(e) = self.replace_active(&[]) {
            discard_archive(&archive_path);
            return Err(e);
        }

        info!(archived, archive = %archive_path.display(), "rotated event store");
        Ok(PurgeReport {
            archived,
            kept: 0,
            archive_path: Some(archive_path),
            archive_sha256: Some(archive_sha256),
        })
    }

    /// Write `bytes` to a fresh, never-overwritten archive file.
    fn write_archive(&self, prefix: &str, bytes: &[u8]) -> EvchainResult<(PathBuf, String)> {
        fs::create_dir_all(&self.archive_dir).map_err(|e| {
            EvchainError::io(format!("creating archive directory {}", self.archive_dir.display()), e)
        })?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let mut temp = self.synced_temp(&self.archive_dir, bytes)?;
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}-{}.jsonl", prefix, stamp)
            } else {
                format!("{}-{}-{}.jsonl", prefix, stamp, attempt)
            };
            let path = self.archive_dir.join(name);
            match temp.persist_noclobber(&path) {
                Ok(_) => return Ok((path, sha256_hex(bytes))),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists && attempt < 1_000 => {
                    temp = e.file;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(EvchainError::io(
                        format!("writing archive {}", path.display()),
                        e.error,
                    ))
                }
            }
        }
    }

    /// Atomically replace the active store with `bytes`.
    fn replace_active(&self, bytes: &[u8]) -> EvchainResult<()> {
        let temp = self.synced_temp(&self.dir, bytes)?;
        temp.persist(&self.events_path).map_err(|e| {
            EvchainError::io(format!("replacing {}", self.events_path.display()), e.error)
        })?;
        Ok(())
    }

    fn synced_temp(&self, dir: &Path, bytes: &[u8]) -> EvchainResult<NamedTempFile> {
        let io_err = |e| EvchainError::io(format!("writing temp file in {}", dir.display()), e);
        let mut temp = NamedTempFile::new_in(dir).map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o600)).map_err(io_err)?;
        }
        temp.write_all(bytes).map_err(io_err)?;
        temp.flush().map_err(io_err)?;
        if self.config.store.fsync {
            if let Err(e) = temp.as_file().sync_all() {
                warn!(dir = %dir.display(), error = %e, "fsync of rewritten file failed");
            }
        }
        Ok(temp)
    }
}

fn row_timestamp(row: &ParsedLine) -> Option<DateTime<Utc>> {
    row.as_object()?.get("ts")?.as_str().and_then(parse_ts)
}

fn discard_archive(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(archive = %path.display(), error = %e, "could not remove archive after failed rewrite");
    }
}
