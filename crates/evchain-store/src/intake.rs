//! Turning a collaborator's `RawEvent` into the events that get appended.
//!
//! Runs before the store lock is taken: it only sanitizes and stamps, it
//! never reads the store.

use chrono::Utc;
use serde_json::{json, Map, Value};

use evchain_contracts::event::{format_ts, new_event_id, Actor, ActorKind, Event, RawEvent, RISK_FLAGGED};
use evchain_contracts::report::SanitizeStats;
use evchain_core::canonical::sha256_hex;
use evchain_core::config::EventsConfig;
use evchain_sanitize::Sanitizer;

/// The events produced for one `RawEvent`, in append order.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub primary: Event,
    /// `risk.flagged` companion, present when sanitization altered anything.
    pub companion: Option<Event>,
    pub stats: SanitizeStats,
}

impl Prepared {
    pub fn into_events(self) -> Vec<Event> {
        let mut events = vec![self.primary];
        events.extend(self.companion);
        events
    }
}

/// Sanitize, stamp, and apply the allow-list to one raw event.
pub fn prepare(raw: RawEvent, sanitizer: &Sanitizer, events: &EventsConfig) -> Prepared {
    let mut stats = SanitizeStats::default();

    let (source, s) = sanitizer.sanitize_identifier(Some(&raw.source), "unknown");
    stats += s;

    let actor_fallback = format!("{}:unknown", source);
    let (actor_id, s) = sanitizer.sanitize_identifier(raw.actor.id.as_deref(), &actor_fallback);
    stats += s;

    let trace_id = match raw.trace_id.as_deref() {
        Some(trace) => {
            let (clean, s) = sanitizer.sanitize_identifier(Some(trace), "");
            stats += s;
            Some(clean).filter(|t| !t.is_empty())
        }
        None => None,
    };

    let (event_type, data) = if events.is_allowed(&raw.event_type) {
        let (event_type, s) = sanitizer.sanitize_identifier(Some(&raw.event_type), "unknown");
        stats += s;
        let (data, s) = sanitizer.sanitize(&raw.data);
        stats += s;
        (event_type, data)
    } else {
        (
            RISK_FLAGGED.to_string(),
            json!({
                "reason": "invalid_event_type",
                "invalid_event_type_hash": sha256_hex(raw.event_type.as_bytes()),
            }),
        )
    };

    let event_id = match raw.event_id.as_deref() {
        Some(id) => {
            let (clean, s) = sanitizer.sanitize_identifier(Some(id), "");
            stats += s;
            if clean.is_empty() {
                new_event_id()
            } else {
                clean
            }
        }
        None => new_event_id(),
    };

    let ts = format_ts(raw.ts.unwrap_or_else(Utc::now));

    let primary = Event {
        schema_version: events.schema_version.clone(),
        event_id,
        ts: ts.clone(),
        event_type,
        actor: Actor {
            kind: raw.actor.kind,
            id: actor_id.clone(),
        },
        source: source.clone(),
        trace_id: trace_id.clone(),
        build: raw.build,
        data: into_mapping(data),
    };

    let companion = (!stats.is_clean()).then(|| Event {
        schema_version: events.schema_version.clone(),
        event_id: new_event_id(),
        ts,
        event_type: RISK_FLAGGED.to_string(),
        actor: Actor {
            kind: ActorKind::System,
            id: actor_id,
        },
        source,
        trace_id,
        build: primary.build.clone(),
        data: json!({
            "reason": "telemetry_sanitized",
            "trigger_event_type": primary.event_type,
            "fields_redacted_count": stats.redacted,
            "fields_truncated_count": stats.truncated,
        }),
    });

    Prepared {
        primary,
        companion,
        stats,
    }
}

/// `data` is always stored as a mapping; scalars and arrays are wrapped.
fn into_mapping(data: Value) -> Value {
    match data {
        Value::Object(_) => data,
        Value::Null => Value::Object(Map::new()),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Value::Object(map)
        }
    }
}
