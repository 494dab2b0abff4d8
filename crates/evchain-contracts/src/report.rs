//! Reports produced by scans and maintenance operations.
//!
//! None of these are persisted as part of the chain; they are returned to
//! the caller and may be printed or written out by a collaborator.

use std::ops::AddAssign;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The kind of integrity problem found at one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The row is a JSON object but lacks `prev_hash` or `event_hash`.
    MissingHashFields,
    /// The stored `prev_hash` differs from the previous row's `event_hash`.
    PrevHashMismatch,
    /// The stored `event_hash` differs from the hash recomputed from content.
    EventHashMismatch,
    /// The line is not valid JSON or not a JSON object.
    MalformedRow,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingHashFields => "missing_hash_fields",
            Self::PrevHashMismatch => "prev_hash_mismatch",
            Self::EventHashMismatch => "event_hash_mismatch",
            Self::MalformedRow => "malformed_row",
        }
    }
}

/// One integrity problem, located by its row index in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub row_index: usize,
    pub kind: ViolationKind,
    pub detail: String,
}

/// The full result of verifying a store.
///
/// Every violation is listed; verification never stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub ok: bool,
    /// Rows examined, malformed ones included.
    pub checked_rows: usize,
    pub violations: Vec<Violation>,
}

impl VerificationReport {
    pub fn from_violations(checked_rows: usize, violations: Vec<Violation>) -> Self {
        Self {
            ok: violations.is_empty(),
            checked_rows,
            violations,
        }
    }

    /// Row indices at which a violation of `kind` was reported.
    pub fn rows_with(&self, kind: ViolationKind) -> Vec<usize> {
        self.violations
            .iter()
            .filter(|v| v.kind == kind)
            .map(|v| v.row_index)
            .collect()
    }
}

/// Outcome of a retention purge or a full rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Rows moved to the archive file.
    pub archived: usize,
    /// Rows left in the active store.
    pub kept: usize,
    /// The archive written by this operation, if any rows were archived.
    pub archive_path: Option<PathBuf>,
    /// SHA-256 (hex) of the archive file contents.
    pub archive_sha256: Option<String>,
}

impl PurgeReport {
    pub fn nothing_archived(kept: usize) -> Self {
        Self {
            archived: 0,
            kept,
            archive_path: None,
            archive_sha256: None,
        }
    }
}

/// Location, size, and appendability of the active store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub path: PathBuf,
    pub row_count: usize,
    /// Why the next append would be refused with `CHAIN_BROKEN`, if it would.
    pub tail_defect: Option<String>,
}

/// Counters produced by one sanitization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeStats {
    pub redacted: usize,
    pub truncated: usize,
}

impl SanitizeStats {
    pub fn redacted() -> Self {
        Self {
            redacted: 1,
            truncated: 0,
        }
    }

    pub fn truncated() -> Self {
        Self {
            redacted: 0,
            truncated: 1,
        }
    }

    /// True when sanitization left the input unchanged in substance.
    pub fn is_clean(&self) -> bool {
        self.redacted == 0 && self.truncated == 0
    }
}

impl AddAssign for SanitizeStats {
    fn add_assign(&mut self, other: Self) {
        self.redacted += other.redacted;
        self.truncated += other.truncated;
    }
}
