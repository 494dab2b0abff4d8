//! Snapshot digests and summary files.
//!
//! A snapshot file holds the canonical JSON of one summary, so the SHA-256 of
//! the file bytes equals the snapshot digest.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use evchain_contracts::error::{EvchainError, EvchainResult};
use evchain_contracts::summary::{AggregateSummary, SUMMARY_SCHEMA_VERSION};
use evchain_core::canonical::{canonical_digest, to_canonical_string};

/// A summary with its deterministic digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub summary: AggregateSummary,
    /// SHA-256 (hex) of the canonical summary.
    pub sha256: String,
}

impl Snapshot {
    pub fn of(summary: AggregateSummary) -> EvchainResult<Self> {
        let sha256 = summary_digest(&summary)?;
        Ok(Self { summary, sha256 })
    }

    /// Write the canonical summary to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> EvchainResult<()> {
        write_summary(&self.summary, path)
    }
}

pub fn summary_digest(summary: &AggregateSummary) -> EvchainResult<String> {
    canonical_digest(summary)
}

/// Write `summary` as canonical JSON.
pub fn write_summary(summary: &AggregateSummary, path: &Path) -> EvchainResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| EvchainError::io(format!("creating {}", parent.display()), e))?;
    }
    let text = to_canonical_string(summary)?;
    std::fs::write(path, text).map_err(|e| EvchainError::io(format!("writing {}", path.display()), e))?;
    debug!(path = %path.display(), "summary written");
    Ok(())
}

/// Load a summary file written by `write_summary`, or a serialized
/// `Snapshot` (whose digest is then checked).
///
/// Fails with `InvalidSummary` when the document is not JSON, has another
/// `schema_version`, or does not have the summary shape.
pub fn load_summary(path: &Path) -> EvchainResult<AggregateSummary> {
    let invalid = |reason: String| EvchainError::InvalidSummary { reason };

    let text = std::fs::read_to_string(path)
        .map_err(|e| EvchainError::io(format!("reading summary {}", path.display()), e))?;
    let document: Value = serde_json::from_str(&text)
        .map_err(|e| invalid(format!("{} is not valid JSON: {}", path.display(), e)))?;

    let (body, expected_digest) = match document {
        Value::Object(mut map) if map.contains_key("summary") && map.contains_key("sha256") => {
            let digest = map.remove("sha256").and_then(|v| v.as_str().map(str::to_string));
            (map.remove("summary").unwrap_or(Value::Null), digest)
        }
        Value::Object(map) => (Value::Object(map), None),
        _ => return Err(invalid(format!("{} must hold a JSON object", path.display()))),
    };

    match body.get("schema_version").and_then(Value::as_str) {
        Some(SUMMARY_SCHEMA_VERSION) => {}
        other => {
            return Err(invalid(format!(
                "unsupported schema_version {:?}; expected {}",
                other, SUMMARY_SCHEMA_VERSION
            )))
        }
    }

    let summary: AggregateSummary = serde_json::from_value(body)
        .map_err(|e| invalid(format!("{} is not a summary: {}", path.display(), e)))?;

    if let Some(expected) = expected_digest {
        let actual = summary_digest(&summary)?;
        if actual != expected {
            return Err(invalid(format!(
                "snapshot digest mismatch: recorded {}, computed {}",
                expected, actual
            )));
        }
    }
    Ok(summary)
}
