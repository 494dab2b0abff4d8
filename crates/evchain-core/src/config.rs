//! TOML configuration for the store, the sanitizer, and event handling.
//!
//! Every tunable that affects observable behavior (lock budget, length and
//! depth caps, secret-pattern additions) lives here with a documented
//! default, so tests and operators can see the exact values in play.
//!
//! Example:
//! ```toml
//! [store]
//! lock_timeout_ms = 2000
//!
//! [sanitizer]
//! max_string_length = 120
//! extra_secret_patterns = ["\\binternal-[0-9a-f]{12}\\b"]
//!
//! [events]
//! allowed_event_types = ["runner.started", "plan.generated"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use evchain_contracts::error::{EvchainError, EvchainResult};
use evchain_contracts::event::SCHEMA_VERSION;

/// File layout and locking behavior of the on-disk store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name of the active append-only file inside the store directory.
    pub events_file: String,
    /// Sub-directory that receives purge/rotation archives.
    pub archive_dir: String,
    /// Upper bound on waiting for the store lock.
    pub lock_timeout_ms: u64,
    /// Base sleep between lock attempts.
    pub lock_poll_interval_ms: u64,
    /// Random extra sleep (0..=jitter) added to each poll.
    pub lock_poll_jitter_ms: u64,
    /// Call fsync after each append and rewrite. Failure is logged, not fatal.
    pub fsync: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            events_file: "events.jsonl".to_string(),
            archive_dir: "archive".to_string(),
            lock_timeout_ms: 5_000,
            lock_poll_interval_ms: 10,
            lock_poll_jitter_ms: 10,
            fsync: true,
        }
    }
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }
}

/// Caps and rule additions for payload sanitization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Strings longer than this (in characters) are truncated.
    pub max_string_length: usize,
    /// Containers nested deeper than this are replaced by a marker.
    pub max_depth: usize,
    /// Arrays/objects keep at most this many entries.
    pub max_collection_items: usize,
    /// Minimum length for the high-entropy token rule.
    pub min_entropy_token_length: usize,
    /// Minimum Shannon entropy (bits per character) for that rule.
    pub min_entropy_bits: f64,
    /// Additional regular expressions whose matches are redacted.
    pub extra_secret_patterns: Vec<String>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_string_length: 200,
            max_depth: 16,
            max_collection_items: 512,
            min_entropy_token_length: 32,
            min_entropy_bits: 3.5,
            extra_secret_patterns: Vec::new(),
        }
    }
}

/// How incoming events are stamped and filtered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Written into every event's `schema_version`.
    pub schema_version: String,
    /// When non-empty, event types outside this list are recorded as
    /// `risk.flagged` with only a hash of the rejected type.
    pub allowed_event_types: Vec<String>,
    /// Default retention used by collaborators when no window is given.
    pub retention_days: u32,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            allowed_event_types: Vec::new(),
            retention_days: 30,
        }
    }
}

impl EventsConfig {
    pub fn is_allowed(&self, event_type: &str) -> bool {
        self.allowed_event_types.is_empty()
            || self.allowed_event_types.iter().any(|t| t == event_type)
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvchainConfig {
    pub store: StoreConfig,
    pub sanitizer: SanitizerConfig,
    pub events: EventsConfig,
}

impl EvchainConfig {
    /// Parse `s` as TOML. Missing sections and keys take their defaults.
    ///
    /// Returns `EvchainError::ConfigError` if the TOML is malformed or a
    /// value fails validation.
    pub fn from_toml_str(s: &str) -> EvchainResult<Self> {
        let config: EvchainConfig = toml::from_str(s).map_err(|e| EvchainError::ConfigError {
            reason: format!("failed to parse config TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as TOML configuration.
    pub fn from_file(path: &Path) -> EvchainResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| EvchainError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        let config = Self::from_toml_str(&contents)?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Reject values that would make the store unusable.
    pub fn validate(&self) -> EvchainResult<()> {
        let invalid = |reason: &str| {
            Err(EvchainError::ConfigError {
                reason: reason.to_string(),
            })
        };
        if self.store.events_file.trim().is_empty() {
            return invalid("store.events_file must not be empty");
        }
        if self.store.events_file.contains(['/', '\\']) {
            return invalid("store.events_file must be a bare file name");
        }
        if self.store.archive_dir.trim().is_empty() {
            return invalid("store.archive_dir must not be empty");
        }
        if self.sanitizer.max_string_length == 0 {
            return invalid("sanitizer.max_string_length must be > 0");
        }
        if self.sanitizer.max_depth == 0 {
            return invalid("sanitizer.max_depth must be > 0");
        }
        if self.sanitizer.max_collection_items == 0 {
            return invalid("sanitizer.max_collection_items must be > 0");
        }
        if self.events.schema_version.trim().is_empty() {
            return invalid("events.schema_version must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EvchainConfig::from_toml_str("").unwrap();
        assert_eq!(config, EvchainConfig::default());
        assert_eq!(config.store.lock_timeout(), Duration::from_secs(5));
        assert_eq!(config.sanitizer.max_string_length, 200);
        assert_eq!(config.events.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = EvchainConfig::from_toml_str(
            r#"
            [store]
            lock_timeout_ms = 250

            [sanitizer]
            extra_secret_patterns = ["internal-[0-9]+"]

            [events]
            allowed_event_types = ["runner.started"]
            "#,
        )
        .unwrap();

        assert_eq!(config.store.lock_timeout_ms, 250);
        assert_eq!(config.store.events_file, "events.jsonl");
        assert_eq!(config.sanitizer.extra_secret_patterns, vec!["internal-[0-9]+"]);
        assert!(config.events.is_allowed("runner.started"));
        assert!(!config.events.is_allowed("quest.completed"));
    }

    #[test]
    fn empty_allow_list_accepts_everything() {
        assert!(EventsConfig::default().is_allowed("anything.at_all"));
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = EvchainConfig::from_toml_str("[store\nlock_timeout_ms = ").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn validation_rejects_path_like_events_file() {
        let err = EvchainConfig::from_toml_str(
            r#"
            [store]
            events_file = "../elsewhere.jsonl"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("bare file name"));
    }

    #[test]
    fn validation_rejects_zero_caps() {
        let err = EvchainConfig::from_toml_str(
            r#"
            [sanitizer]
            max_depth = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_depth"));
    }
}
