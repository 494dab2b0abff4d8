//! # evchain-contracts
//!
//! Shared types and errors for the evchain tamper-evident telemetry log.
//!
//! All crates in the workspace import from here. No I/O and no hashing live
//! in this crate, only data definitions and error types.

pub mod build_info;
pub mod error;
pub mod event;
pub mod report;
pub mod summary;
pub mod window;

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use error::EvchainError;
    use event::{format_ts, parse_ts, Actor, ActorKind, Event, StoredRow};
    use report::{SanitizeStats, VerificationReport, Violation, ViolationKind};
    use window::{parse_window, ExportRange, RetentionWindow};

    fn sample_event() -> Event {
        Event {
            schema_version: event::SCHEMA_VERSION.to_string(),
            event_id: "evt-1".to_string(),
            ts: "2026-02-11T09:30:00Z".to_string(),
            event_type: "plan.generated".to_string(),
            actor: Actor {
                kind: ActorKind::Human,
                id: "human:jordan".to_string(),
            },
            source: "cli".to_string(),
            trace_id: None,
            build: serde_json::Map::new(),
            data: json!({ "quest_count": 3 }),
        }
    }

    // ── Timestamps ───────────────────────────────────────────────────────────

    #[test]
    fn format_ts_uses_whole_seconds_and_z_suffix() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 11, 9, 30, 0).unwrap()
            + Duration::milliseconds(250);
        assert_eq!(format_ts(ts), "2026-02-11T09:30:00Z");
    }

    #[test]
    fn parse_ts_normalizes_offsets_and_naive_values() {
        let expected = Utc.with_ymd_and_hms(2026, 2, 11, 9, 30, 0).unwrap();
        assert_eq!(parse_ts("2026-02-11T09:30:00Z"), Some(expected));
        assert_eq!(parse_ts("2026-02-11T11:30:00+02:00"), Some(expected));
        assert_eq!(parse_ts("2026-02-11T09:30:00"), Some(expected));
        assert_eq!(parse_ts("yesterday"), None);
    }

    #[test]
    fn new_event_id_produces_unique_values() {
        let ids: std::collections::HashSet<String> =
            (0..100).map(|_| event::new_event_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    // ── Actor ────────────────────────────────────────────────────────────────

    #[test]
    fn actor_kind_parse_is_case_insensitive() {
        assert_eq!(ActorKind::parse(" Agent "), Some(ActorKind::Agent));
        assert_eq!(ActorKind::parse("HUMAN"), Some(ActorKind::Human));
        assert_eq!(ActorKind::parse("robot"), None);
    }

    // ── StoredRow serde ──────────────────────────────────────────────────────

    #[test]
    fn stored_row_serializes_flat() {
        let row = StoredRow {
            event: sample_event(),
            prev_hash: StoredRow::GENESIS_HASH.to_string(),
            event_hash: "ab".repeat(32),
        };
        let value = serde_json::to_value(&row).unwrap();
        let object = value.as_object().unwrap();

        assert!(object.contains_key("event_type"));
        assert!(object.contains_key("prev_hash"));
        assert!(object.contains_key("event_hash"));
        assert!(!object.contains_key("event"), "event fields must be flattened");
        // trace_id is kept as an explicit null so the hashed shape is stable.
        assert_eq!(object.get("trace_id"), Some(&serde_json::Value::Null));

        let decoded: StoredRow = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, row);
        assert!(decoded.is_genesis());
    }

    // ── Windows ──────────────────────────────────────────────────────────────

    #[test]
    fn parse_window_accepts_days_and_hours() {
        assert_eq!(parse_window("30d").unwrap(), Duration::days(30));
        assert_eq!(parse_window(" 24H ").unwrap(), Duration::hours(24));
    }

    #[test]
    fn parse_window_rejects_bad_values() {
        for bad in ["", "d", "0d", "-3d", "7w", "7", "seven days", "36501d", "99999999d"] {
            let err = parse_window(bad).unwrap_err();
            assert!(
                matches!(err, EvchainError::InvalidWindow { .. }),
                "expected InvalidWindow for {bad:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn retention_window_cutoff_subtracts_from_now() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 0, 0, 0).unwrap();
        let window: RetentionWindow = "30d".parse().unwrap();
        assert_eq!(
            window.cutoff(now),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(RetentionWindow::days(30), window);
    }

    #[test]
    fn longest_window_is_accepted_and_huge_spans_clamp() {
        assert_eq!(
            parse_window("36500d").unwrap(),
            Duration::days(window::MAX_WINDOW_DAYS)
        );

        let now = Utc.with_ymd_and_hms(2026, 3, 31, 0, 0, 0).unwrap();
        let huge = RetentionWindow {
            older_than: Duration::MAX,
        };
        assert_eq!(huge.cutoff(now), DateTime::<Utc>::MIN_UTC);
        let range = ExportRange::trailing(Duration::MAX, now);
        assert_eq!(range.start, DateTime::<Utc>::MIN_UTC);
        assert!(range.contains(Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn export_range_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 0, 0, 0).unwrap();
        let range = ExportRange::trailing(Duration::days(7), now);
        assert!(range.contains(now));
        assert!(range.contains(now - Duration::days(7)));
        assert!(!range.contains(now - Duration::days(7) - Duration::seconds(1)));
        assert!(!range.contains(now + Duration::seconds(1)));
    }

    // ── Reports ──────────────────────────────────────────────────────────────

    #[test]
    fn verification_report_ok_tracks_violations() {
        assert!(VerificationReport::from_violations(3, vec![]).ok);

        let report = VerificationReport::from_violations(
            3,
            vec![
                Violation {
                    row_index: 1,
                    kind: ViolationKind::EventHashMismatch,
                    detail: "stored hash differs".to_string(),
                },
                Violation {
                    row_index: 2,
                    kind: ViolationKind::PrevHashMismatch,
                    detail: "link differs".to_string(),
                },
            ],
        );
        assert!(!report.ok);
        assert_eq!(report.rows_with(ViolationKind::EventHashMismatch), vec![1]);
        assert_eq!(report.rows_with(ViolationKind::PrevHashMismatch), vec![2]);
    }

    #[test]
    fn violation_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ViolationKind::MissingHashFields).unwrap();
        assert_eq!(json, "\"missing_hash_fields\"");
        assert_eq!(ViolationKind::MissingHashFields.as_str(), "missing_hash_fields");
    }

    #[test]
    fn sanitize_stats_accumulate() {
        let mut stats = SanitizeStats::default();
        assert!(stats.is_clean());
        stats += SanitizeStats::redacted();
        stats += SanitizeStats::truncated();
        stats += SanitizeStats::redacted();
        assert_eq!(stats, SanitizeStats { redacted: 2, truncated: 1 });
        assert!(!stats.is_clean());
    }

    // ── Summaries ────────────────────────────────────────────────────────────

    #[test]
    fn tally_keeps_empty_breakdowns_and_rounds_rates() {
        let mut tally = summary::Tally::default();
        tally.breakdown("completions_by_pillar");
        tally.bump("events_by_type", "plan.generated", 1);
        tally.bump("events_by_type", "plan.generated", 2);
        tally.set_rate("quest_success_rate", 2.0 / 3.0);

        assert!(tally.breakdowns["completions_by_pillar"].is_empty());
        assert_eq!(tally.breakdowns["events_by_type"]["plan.generated"], 3);
        assert_eq!(tally.rates["quest_success_rate"], 0.6667);
        assert_eq!(summary::round_rate(f64::NAN), 0.0);
    }

    #[test]
    fn tally_bump_saturates() {
        let mut tally = summary::Tally::default();
        tally.bump("xp_by_pillar", "Mind", i64::MAX);
        tally.bump("xp_by_pillar", "Mind", i64::MAX);
        tally.bump("xp_by_pillar", "Body", i64::MIN);
        tally.bump("xp_by_pillar", "Body", -1);
        assert_eq!(tally.breakdowns["xp_by_pillar"]["Mind"], i64::MAX);
        assert_eq!(tally.breakdowns["xp_by_pillar"]["Body"], i64::MIN);
    }

    // ── EvchainError ─────────────────────────────────────────────────────────

    #[test]
    fn error_codes_are_stable() {
        let broken = EvchainError::ChainBroken {
            reason: "missing_hash_fields".to_string(),
        };
        assert_eq!(broken.code(), "CHAIN_BROKEN");
        assert!(!broken.is_retryable());
        assert!(broken.to_string().contains("missing_hash_fields"));

        let timeout = EvchainError::LockTimeout {
            path: "/tmp/events.jsonl.lock".to_string(),
            waited_ms: 5000,
        };
        assert_eq!(timeout.code(), "LOCK_TIMEOUT");
        assert!(timeout.is_retryable());
        assert!(timeout.to_string().contains("5000"));
    }

    #[test]
    fn error_io_display_names_operation() {
        let err = EvchainError::io(
            "appending row",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        let msg = err.to_string();
        assert!(msg.contains("appending row"));
        assert!(msg.contains("disk full"));
        assert_eq!(err.code(), "IO_FAILURE");
    }
}
