//! Event, actor, and stored-row types.
//!
//! A collaborator hands the log a `RawEvent`. The store turns it into an
//! `Event` (sanitized, with id/timestamp/schema filled in) and appends it as a
//! `StoredRow`, which adds the two hash fields that link it into the chain.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Format revision written into every event.
pub const SCHEMA_VERSION: &str = "0.1";

/// Event type of the companion record emitted when sanitization alters a
/// payload, and of rewritten events with a rejected type.
pub const RISK_FLAGGED: &str = "risk.flagged";

/// Event type recorded by collaborators after a retention purge.
pub const TELEMETRY_PURGED: &str = "telemetry.purged";

/// Event types emitted by the runner and its bridges.
///
/// The log itself treats `event_type` as opaque; this list is what operators
/// usually put in `allowed_event_types`.
pub const KNOWN_EVENT_TYPES: &[&str] = &[
    "runner.started",
    "plan.generated",
    "proof.submitted",
    "proof.rejected",
    "quest.completed",
    "quest.failed",
    "scorecard.updated",
    "profile.updated",
    "capability.granted",
    "capability.revoked",
    "feedback.submitted",
    "preset.applied",
    RISK_FLAGGED,
    TELEMETRY_PURGED,
    "trust_signal.updated",
];

/// Who caused an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Human,
    Agent,
    System,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }

    /// Case-insensitive parse; `None` for anything outside the three kinds.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "human" => Some(Self::Human),
            "agent" => Some(Self::Agent),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The actor as supplied by a collaborator; `id` may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    pub kind: ActorKind,
    #[serde(default)]
    pub id: Option<String>,
}

impl ActorRef {
    pub fn new(kind: ActorKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: Some(id.into()),
        }
    }

    pub fn anonymous(kind: ActorKind) -> Self {
        Self { kind, id: None }
    }
}

/// The actor as stored: `id` is always present and sanitized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub kind: ActorKind,
    pub id: String,
}

/// An event submitted by a collaborator, before sanitization and hashing.
///
/// `event_id` and `ts` are normally left empty and filled in by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub event_type: String,
    pub actor: ActorRef,
    pub source: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub build: Map<String, Value>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>, actor: ActorRef, source: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            actor,
            source: source.into(),
            trace_id: None,
            build: Map::new(),
            data: Value::Object(Map::new()),
            event_id: None,
            ts: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_build(mut self, build: Map<String, Value>) -> Self {
        self.build = build;
        self
    }

    /// Pin the event timestamp instead of using the append time.
    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = Some(ts);
        self
    }
}

/// One logical record without its hash fields.
///
/// This is exactly the content the chain hash commits to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub schema_version: String,
    pub event_id: String,
    pub ts: String,
    pub event_type: String,
    pub actor: Actor,
    pub source: String,
    pub trace_id: Option<String>,
    pub build: Map<String, Value>,
    pub data: Value,
}

impl Event {
    /// Parsed `ts`, or `None` when the stored text is not a valid timestamp.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_ts(&self.ts)
    }
}

/// An event as it sits in the store: content plus chain linkage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    #[serde(flatten)]
    pub event: Event,

    /// `event_hash` of the preceding row, or `GENESIS_HASH` for the first.
    pub prev_hash: String,

    /// SHA-256 (hex) over `prev_hash + ":" + canonical(event)`.
    pub event_hash: String,
}

impl StoredRow {
    /// The `prev_hash` of the first row of every chain: 64 hex zeros.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";

    pub fn is_genesis(&self) -> bool {
        self.prev_hash == Self::GENESIS_HASH
    }
}

/// Render a timestamp the way it is stored: RFC 3339, whole seconds, `Z`.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored timestamp. Offsets are normalized to UTC; a timestamp
/// without an offset is read as UTC.
pub fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// A fresh random event identifier (UUID v4, hyphenated text).
pub fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
