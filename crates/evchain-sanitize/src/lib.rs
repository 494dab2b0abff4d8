//! # evchain-sanitize
//!
//! Redaction and truncation of telemetry payloads before they reach disk.
//!
//! [`Sanitizer`] walks a `serde_json::Value` recursively and returns a cleaned
//! copy plus [`SanitizeStats`](evchain_contracts::report::SanitizeStats).
//! It never fails on input: telemetry must not crash the collaborator that
//! emits it.
//!
//! ```rust,ignore
//! use evchain_core::config::SanitizerConfig;
//! use evchain_sanitize::Sanitizer;
//!
//! let sanitizer = Sanitizer::new(SanitizerConfig::default())?;
//! let (clean, stats) = sanitizer.sanitize(&json!({ "token": "sk-..." }));
//! ```

pub mod rules;
pub mod sanitizer;

pub use rules::{RuleHit, SecretRules};
pub use sanitizer::{Sanitizer, DEPTH_LIMIT, REDACTED, TRUNCATED_SUFFIX};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use evchain_contracts::report::SanitizeStats;
    use evchain_core::config::SanitizerConfig;

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn sanitizer() -> Sanitizer {
        Sanitizer::new(SanitizerConfig::default()).unwrap()
    }

    fn sanitizer_with(config: SanitizerConfig) -> Sanitizer {
        Sanitizer::new(config).unwrap()
    }

    /// Nest `leaf` inside `levels` single-key objects.
    fn nested(levels: usize, leaf: Value) -> Value {
        (0..levels).fold(leaf, |inner, _| json!({ "child": inner }))
    }

    // ── Redaction and truncation ──────────────────────────────────────────────

    #[test]
    fn redacts_secret_like_values() {
        let payload = json!({
            "token": "sk-abcdefghijklmnop",
            "nested": { "email": "user@example.com", "note": "a".repeat(250) },
        });
        let (clean, stats) = sanitizer().sanitize(&payload);

        assert_eq!(clean["token"], REDACTED);
        assert_eq!(clean["nested"]["email"], REDACTED);
        let note = clean["nested"]["note"].as_str().unwrap();
        assert!(note.ends_with(TRUNCATED_SUFFIX));
        assert_eq!(note.chars().count(), 200 + TRUNCATED_SUFFIX.len());
        assert_eq!(stats, SanitizeStats { redacted: 2, truncated: 1 });
    }

    #[test]
    fn secret_beyond_truncation_point_is_still_redacted() {
        let text = format!("{} sk-abcdefghijklmnopqrst", "x ".repeat(150));
        let (clean, stats) = sanitizer().sanitize(&json!({ "note": text }));
        assert_eq!(clean["note"], REDACTED);
        assert_eq!(stats, SanitizeStats::redacted());
    }

    #[test]
    fn scalars_pass_through_untouched() {
        let payload = json!({ "n": 42, "f": 1.5, "b": true, "z": null, "s": "fine" });
        let (clean, stats) = sanitizer().sanitize(&payload);
        assert_eq!(clean, payload);
        assert!(stats.is_clean());
    }

    #[test]
    fn strings_in_arrays_are_visited() {
        let payload = json!(["ok", ["user@example.com", 7]]);
        let (clean, stats) = sanitizer().sanitize(&payload);
        assert_eq!(clean, json!(["ok", [REDACTED, 7]]));
        assert_eq!(stats.redacted, 1);
    }

    #[test]
    fn map_keys_are_sanitized() {
        let payload = json!({ "user@example.com": 1, "plain\u{0007}": 2 });
        let (clean, stats) = sanitizer().sanitize(&payload);
        let object = clean.as_object().unwrap();
        assert_eq!(object.get(REDACTED), Some(&json!(1)));
        assert_eq!(object.get("plain"), Some(&json!(2)));
        assert_eq!(stats.redacted, 1);
    }

    #[test]
    fn control_characters_are_stripped() {
        let (clean, stats) = sanitizer().sanitize(&json!("line\none\ttab\u{0000}"));
        assert_eq!(clean, json!("lineonetab"));
        assert!(stats.is_clean());
    }

    #[test]
    fn format_and_private_use_characters_are_stripped() {
        let sanitizer = sanitizer();
        let (id, stats) = sanitizer.sanitize_identifier(Some("human:\u{202E}nimda\u{200B}"), "x");
        assert_eq!(id, "human:nimda");
        assert!(stats.is_clean());

        let (clean, _) = sanitizer.sanitize(&json!(
            "\u{FEFF}a\u{2066}b\u{2069}c\u{E000}d\u{FFFF}e\u{E0041}f\u{00AD}g"
        ));
        assert_eq!(clean, json!("abcdefg"));

        let (clean, _) = sanitizer.sanitize(&json!("naïve café 日本 🙂"));
        assert_eq!(clean, json!("naïve café 日本 🙂"));
    }

    // ── Bounds ────────────────────────────────────────────────────────────────

    #[test]
    fn containers_beyond_max_depth_become_marker() {
        let config = SanitizerConfig {
            max_depth: 3,
            ..SanitizerConfig::default()
        };
        let payload = nested(5, json!("leaf"));
        let (clean, stats) = sanitizer_with(config).sanitize(&payload);

        assert_eq!(clean, nested(3, json!(DEPTH_LIMIT)));
        assert_eq!(stats, SanitizeStats::truncated());
    }

    #[test]
    fn collections_are_capped() {
        let config = SanitizerConfig {
            max_collection_items: 3,
            ..SanitizerConfig::default()
        };
        let (clean, stats) = sanitizer_with(config).sanitize(&json!([1, 2, 3, 4, 5]));
        assert_eq!(clean, json!([1, 2, 3]));
        assert_eq!(stats, SanitizeStats::truncated());
    }

    #[test]
    fn deeply_nested_input_does_not_overflow() {
        let payload = nested(1_000, json!("leaf"));
        let (clean, stats) = sanitizer().sanitize(&payload);
        assert_eq!(stats.truncated, 1);
        assert_eq!(clean, nested(16, json!(DEPTH_LIMIT)));
    }

    // ── Identifiers ───────────────────────────────────────────────────────────

    #[test]
    fn identifiers_fall_back_when_missing_or_blank() {
        let sanitizer = sanitizer();
        assert_eq!(
            sanitizer.sanitize_identifier(None, "cli:unknown").0,
            "cli:unknown"
        );
        assert_eq!(
            sanitizer.sanitize_identifier(Some(" \u{0001} "), "api:unknown").0,
            "api:unknown"
        );
    }

    #[test]
    fn identifiers_are_cleaned_and_redacted() {
        let sanitizer = sanitizer();
        let (id, stats) = sanitizer.sanitize_identifier(Some("agent:\u{001b}[31mbot"), "x");
        assert_eq!(id, "agent:[31mbot");
        assert!(stats.is_clean());

        let (id, stats) = sanitizer.sanitize_identifier(Some("jordan@example.com"), "x");
        assert_eq!(id, REDACTED);
        assert_eq!(stats, SanitizeStats::redacted());
    }

    // ── Idempotence ───────────────────────────────────────────────────────────

    #[test]
    fn sanitizing_twice_changes_nothing() {
        let config = SanitizerConfig {
            max_depth: 4,
            max_collection_items: 6,
            max_string_length: 20,
            ..SanitizerConfig::default()
        };
        let sanitizer = sanitizer_with(config);
        let payload = json!({
            "token": "sk-abcdefghijklmnopqrstuvwxyz",
            "long": "the quick brown fox jumps over the lazy dog",
            "spaced": "   padded value that is long enough to cut   ",
            "list": [1, 2, 3, 4, 5, 6, 7, 8],
            "deep": nested(6, json!("leaf")),
            "ctrl\u{0002}key": "a\u{0003}b",
        });

        let (once, first_stats) = sanitizer.sanitize(&payload);
        let (twice, second_stats) = sanitizer.sanitize(&once);

        assert!(!first_stats.is_clean());
        assert_eq!(twice, once);
        assert!(second_stats.is_clean(), "second pass must not count anything");
    }

    #[test]
    fn handcrafted_truncated_form_still_gets_secret_check() {
        let text = format!("sk-abcdefghijklmnopqrstu{}", TRUNCATED_SUFFIX);
        let (clean, stats) = sanitizer().sanitize(&json!(text));
        assert_eq!(clean, json!(REDACTED));
        assert_eq!(stats, SanitizeStats::redacted());
    }
}
