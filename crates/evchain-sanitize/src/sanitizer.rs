//! The payload sanitizer.
//!
//! `Sanitizer::sanitize` is a typed visitor over the closed set of JSON value
//! variants. It never fails: every input produces a cleaned value plus
//! counters. Per string it:
//!
//! 1. strips control, format, private-use and noncharacter code points,
//!    then trims surrounding whitespace
//! 2. replaces sensitive strings with `[redacted]`
//! 3. truncates strings over `max_string_length` characters, appending
//!    `...[truncated]`
//!
//! Containers deeper than `max_depth` become `[depth-limit]`; containers with
//! more than `max_collection_items` entries are cut. Sanitizing an already
//! sanitized value returns it unchanged.

use serde_json::{Map, Value};
use tracing::debug;

use evchain_contracts::error::EvchainResult;
use evchain_contracts::report::SanitizeStats;
use evchain_core::config::SanitizerConfig;

use crate::rules::SecretRules;

/// Replacement for a sensitive string.
pub const REDACTED: &str = "[redacted]";

/// Suffix appended to a truncated string.
pub const TRUNCATED_SUFFIX: &str = "...[truncated]";

/// Replacement for a container nested beyond the depth cap.
pub const DEPTH_LIMIT: &str = "[depth-limit]";

/// Recursive redaction and truncation of payloads and identifiers.
#[derive(Debug)]
pub struct Sanitizer {
    config: SanitizerConfig,
    rules: SecretRules,
}

impl Sanitizer {
    /// Build a sanitizer, compiling the rule set.
    ///
    /// Fails only when an `extra_secret_patterns` entry is not a valid regex.
    pub fn new(config: SanitizerConfig) -> EvchainResult<Self> {
        let rules = SecretRules::new(&config)?;
        Ok(Self { config, rules })
    }

    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    pub fn rules(&self) -> &SecretRules {
        &self.rules
    }

    /// Sanitize an arbitrary payload. Map keys are sanitized like strings.
    pub fn sanitize(&self, payload: &Value) -> (Value, SanitizeStats) {
        let mut stats = SanitizeStats::default();
        let clean = self.visit(payload, 0, &mut stats);
        if !stats.is_clean() {
            debug!(
                redacted = stats.redacted,
                truncated = stats.truncated,
                "payload sanitized"
            );
        }
        (clean, stats)
    }

    /// Sanitize an identifier such as `actor.id` or `trace_id`.
    ///
    /// Missing or blank identifiers become `fallback`.
    pub fn sanitize_identifier(&self, value: Option<&str>, fallback: &str) -> (String, SanitizeStats) {
        let mut stats = SanitizeStats::default();
        let clean = match value {
            Some(raw) => self.clean_text(raw, &mut stats),
            None => String::new(),
        };
        if clean.is_empty() {
            return (fallback.to_string(), stats);
        }
        (clean, stats)
    }

    fn visit(&self, value: &Value, depth: usize, stats: &mut SanitizeStats) -> Value {
        match value {
            Value::String(s) => Value::String(self.clean_text(s, stats)),
            Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
            Value::Array(_) | Value::Object(_) if depth >= self.config.max_depth => {
                *stats += SanitizeStats::truncated();
                Value::String(DEPTH_LIMIT.to_string())
            }
            Value::Array(items) => {
                let limit = self.config.max_collection_items;
                if items.len() > limit {
                    *stats += SanitizeStats::truncated();
                }
                Value::Array(
                    items
                        .iter()
                        .take(limit)
                        .map(|item| self.visit(item, depth + 1, stats))
                        .collect(),
                )
            }
            Value::Object(map) => {
                let limit = self.config.max_collection_items;
                if map.len() > limit {
                    *stats += SanitizeStats::truncated();
                }
                let mut clean = Map::new();
                for (key, item) in map.iter().take(limit) {
                    let clean_key = self.clean_text(key, stats);
                    let clean_item = self.visit(item, depth + 1, stats);
                    clean.insert(clean_key, clean_item);
                }
                Value::Object(clean)
            }
        }
    }

    fn clean_text(&self, raw: &str, stats: &mut SanitizeStats) -> String {
        let stripped: String = raw.chars().filter(|c| !is_invisible(*c)).collect();
        let text = stripped.trim();
        if text == REDACTED || text == DEPTH_LIMIT {
            return text.to_string();
        }
        if self.rules.is_sensitive(text) {
            *stats += SanitizeStats::redacted();
            return REDACTED.to_string();
        }
        if self.is_truncated_form(text) {
            return text.to_string();
        }

        let max = self.config.max_string_length;
        if text.chars().count() <= max {
            return text.to_string();
        }
        let mut truncated: String = text.chars().take(max).collect();
        truncated.push_str(TRUNCATED_SUFFIX);
        // A cut can leave a secret-shaped prefix behind; never emit one.
        if self.rules.is_sensitive(&truncated) {
            *stats += SanitizeStats::redacted();
            return REDACTED.to_string();
        }
        *stats += SanitizeStats::truncated();
        truncated
    }

    /// True for output of an earlier truncation, which must not be cut again.
    fn is_truncated_form(&self, text: &str) -> bool {
        text.strip_suffix(TRUNCATED_SUFFIX)
            .is_some_and(|prefix| prefix.chars().count() <= self.config.max_string_length)
    }
}

/// Format characters (Unicode Cf), including bidi overrides and zero-width
/// joiners.
const FORMAT_RANGES: &[(u32, u32)] = &[
    (0x00AD, 0x00AD),
    (0x0600, 0x0605),
    (0x061C, 0x061C),
    (0x06DD, 0x06DD),
    (0x070F, 0x070F),
    (0x0890, 0x0891),
    (0x08E2, 0x08E2),
    (0x180E, 0x180E),
    (0x200B, 0x200F),
    (0x202A, 0x202E),
    (0x2060, 0x2064),
    (0x2066, 0x206F),
    (0xFEFF, 0xFEFF),
    (0xFFF9, 0xFFFB),
    (0x110BD, 0x110BD),
    (0x110CD, 0x110CD),
    (0x13430, 0x1343F),
    (0x1BCA0, 0x1BCA3),
    (0x1D173, 0x1D17A),
    (0xE0001, 0xE0001),
    (0xE0020, 0xE007F),
];

/// Private-use areas (Unicode Co).
const PRIVATE_USE_RANGES: &[(u32, u32)] = &[
    (0xE000, 0xF8FF),
    (0xF0000, 0xFFFFD),
    (0x100000, 0x10FFFD),
];

/// True for code points that render as nothing or as something misleading.
///
/// Surrogates cannot occur in a `str`. Of the unassigned code points only the
/// permanent noncharacters are recognised.
fn is_invisible(c: char) -> bool {
    let cp = u32::from(c);
    c.is_control()
        || in_ranges(cp, FORMAT_RANGES)
        || in_ranges(cp, PRIVATE_USE_RANGES)
        || (0xFDD0..=0xFDEF).contains(&cp)
        || cp & 0xFFFE == 0xFFFE
}

fn in_ranges(cp: u32, ranges: &[(u32, u32)]) -> bool {
    ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&cp))
}
