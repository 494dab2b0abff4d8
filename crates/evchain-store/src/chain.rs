//! Hash-chain primitives: row hashing, linking, and chain verification.
//!
//! Hash input for a row (UTF-8 text, then SHA-256, lowercase hex):
//!
//! ```text
//! prev_hash ":" canonical(row without prev_hash and event_hash)
//! ```
//!
//! The first row of a chain uses `StoredRow::GENESIS_HASH` as `prev_hash`.
//! Rows are never mutated here; `relink` works on a caller-owned copy.

use serde_json::{Map, Value};

use evchain_contracts::{
    error::{EvchainError, EvchainResult},
    event::{Event, StoredRow},
    report::{VerificationReport, Violation, ViolationKind},
};
use evchain_core::canonical::{canonical_string, sha256_hex};

pub const PREV_HASH_FIELD: &str = "prev_hash";
pub const EVENT_HASH_FIELD: &str = "event_hash";

/// One non-blank line of a store file, parsed as far as possible.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// A JSON object; hash fields may or may not be present.
    Object(Map<String, Value>),
    /// Not UTF-8, not JSON, or not a JSON object.
    Malformed(String),
}

impl ParsedLine {
    pub fn parse(line: &str) -> Self {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => Self::Object(map),
            Ok(other) => Self::Malformed(format!("expected a JSON object, found {}", json_kind(&other))),
            Err(e) => Self::Malformed(format!("invalid JSON: {}", e)),
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            Self::Malformed(_) => None,
        }
    }
}

/// SHA-256 over `prev_hash + ":" + canonical(content)`.
///
/// `content` is a row object; its hash fields, if present, are ignored.
pub fn content_hash(prev_hash: &str, content: &Map<String, Value>) -> String {
    let mut body = content.clone();
    body.remove(PREV_HASH_FIELD);
    body.remove(EVENT_HASH_FIELD);
    let canonical = canonical_string(&Value::Object(body));
    sha256_hex(format!("{}:{}", prev_hash, canonical).as_bytes())
}

/// Hash of `event` when chained after `prev_hash`.
pub fn hash_event(prev_hash: &str, event: &Event) -> EvchainResult<String> {
    match serde_json::to_value(event)? {
        Value::Object(map) => Ok(content_hash(prev_hash, &map)),
        other => Err(EvchainError::Serialization {
            reason: format!("event serialized to {} instead of an object", json_kind(&other)),
        }),
    }
}

/// Build the row that follows `prior` (or starts a chain when `None`).
pub fn next_row(prior: Option<&StoredRow>, event: Event) -> EvchainResult<StoredRow> {
    let prev_hash = prior
        .map(|row| row.event_hash.clone())
        .unwrap_or_else(|| StoredRow::GENESIS_HASH.to_string());
    let event_hash = hash_event(&prev_hash, &event)?;
    Ok(StoredRow {
        event,
        prev_hash,
        event_hash,
    })
}

/// Point `row` at `prev_hash` and recompute its `event_hash`.
///
/// Only the two hash fields change. Returns the new `event_hash`.
pub fn relink(row: &mut Map<String, Value>, prev_hash: &str) -> String {
    let event_hash = content_hash(prev_hash, row);
    row.insert(PREV_HASH_FIELD.to_string(), Value::String(prev_hash.to_string()));
    row.insert(EVENT_HASH_FIELD.to_string(), Value::String(event_hash.clone()));
    event_hash
}

/// Why a tail row cannot anchor a new append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailDefect {
    InvalidJson,
    InvalidShape,
    MissingHashFields,
    EventHashMismatch,
}

impl TailDefect {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json_line",
            Self::InvalidShape => "invalid_event_shape",
            Self::MissingHashFields => "missing_hash_fields",
            Self::EventHashMismatch => "event_hash_mismatch",
        }
    }
}

/// Decide whether the text of the last row can anchor the next append.
pub fn check_tail(line: &str) -> Result<StoredRow, TailDefect> {
    let map = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(TailDefect::InvalidShape),
        Err(_) => return Err(TailDefect::InvalidJson),
    };
    let (prev, stored) = match hash_fields(&map) {
        Some(fields) => fields,
        None => return Err(TailDefect::MissingHashFields),
    };
    if content_hash(prev, &map) != stored {
        return Err(TailDefect::EventHashMismatch);
    }
    serde_json::from_value(Value::Object(map)).map_err(|_| TailDefect::InvalidShape)
}

/// Verify a whole chain in file order.
///
/// Rules, applied to every row without stopping early:
///
/// 1. A malformed row is reported as `malformed_row`; a row without both
///    hash fields as `missing_hash_fields`. Either way the expected link is
///    lost, so the next row's `prev_hash` is not checked.
/// 2. Otherwise the stored `prev_hash` must equal the expected link
///    (`GENESIS_HASH` for row 0), else `prev_hash_mismatch`.
/// 3. The stored `event_hash` must equal the hash recomputed from the row's
///    own `prev_hash` and content, else `event_hash_mismatch`.
/// 4. The expected link for the next row is the *recomputed* hash, so an
///    edit to a row's content also surfaces as a broken link at the next row.
pub fn verify_chain(rows: &[ParsedLine]) -> VerificationReport {
    let mut violations = Vec::new();
    let mut expected_prev: Option<String> = Some(StoredRow::GENESIS_HASH.to_string());

    for (row_index, row) in rows.iter().enumerate() {
        let map = match row {
            ParsedLine::Object(map) => map,
            ParsedLine::Malformed(detail) => {
                violations.push(Violation {
                    row_index,
                    kind: ViolationKind::MalformedRow,
                    detail: detail.clone(),
                });
                expected_prev = None;
                continue;
            }
        };

        let (prev, stored) = match hash_fields(map) {
            Some(fields) => fields,
            None => {
                violations.push(Violation {
                    row_index,
                    kind: ViolationKind::MissingHashFields,
                    detail: "row lacks a string prev_hash or event_hash".to_string(),
                });
                expected_prev = None;
                continue;
            }
        };

        if let Some(expected) = &expected_prev {
            if prev != expected {
                violations.push(Violation {
                    row_index,
                    kind: ViolationKind::PrevHashMismatch,
                    detail: format!("prev_hash {} does not link to {}", short(prev), short(expected)),
                });
            }
        }

        let recomputed = content_hash(prev, map);
        if recomputed != stored {
            violations.push(Violation {
                row_index,
                kind: ViolationKind::EventHashMismatch,
                detail: format!(
                    "stored event_hash {} but content hashes to {}",
                    short(stored),
                    short(&recomputed)
                ),
            });
        }

        expected_prev = Some(recomputed);
    }

    VerificationReport::from_violations(rows.len(), violations)
}

fn hash_fields(map: &Map<String, Value>) -> Option<(&str, &str)> {
    let prev = map.get(PREV_HASH_FIELD)?.as_str()?;
    let stored = map.get(EVENT_HASH_FIELD)?.as_str()?;
    Some((prev, stored))
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
