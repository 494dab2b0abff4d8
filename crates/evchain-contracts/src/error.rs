//! Runtime error types for the evchain telemetry log.
//!
//! All fallible operations return `EvchainResult<T>`. Integrity problems found
//! while scanning the log are *not* errors: they are collected as
//! `Violation`s in a `VerificationReport` so a scan never stops early.

use thiserror::Error;

/// The unified error type for the evchain crates.
#[derive(Debug, Error)]
pub enum EvchainError {
    /// The current tail of the store cannot anchor a new row.
    ///
    /// Appends stay refused until the operator purges or rotates the store.
    #[error("telemetry chain is broken at the tail ({reason}); rotate the store before recording")]
    ChainBroken { reason: String },

    /// The store lock was not acquired within the configured budget.
    #[error("store lock '{path}' not acquired within {waited_ms} ms")]
    LockTimeout { path: String, waited_ms: u64 },

    /// A row could not be parsed where a parseable row was required.
    #[error("malformed row at index {row_index}: {detail}")]
    MalformedRow { row_index: usize, detail: String },

    /// A disk read, write, sync, or rename failed.
    #[error("I/O failure while {operation}: {reason}")]
    Io { operation: String, reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A retention or export window could not be parsed.
    #[error("invalid window '{value}': {reason}")]
    InvalidWindow { value: String, reason: String },

    /// An aggregate summary document is unreadable or has the wrong schema.
    #[error("invalid summary: {reason}")]
    InvalidSummary { reason: String },

    /// A value could not be serialized for storage or hashing.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl EvchainError {
    /// Wrap an `std::io::Error` with the operation that produced it.
    pub fn io(operation: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            reason: err.to_string(),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChainBroken { .. } => "CHAIN_BROKEN",
            Self::LockTimeout { .. } => "LOCK_TIMEOUT",
            Self::MalformedRow { .. } => "MALFORMED_ROW",
            Self::Io { .. } => "IO_FAILURE",
            Self::ConfigError { .. } => "CONFIG_ERROR",
            Self::InvalidWindow { .. } => "INVALID_WINDOW",
            Self::InvalidSummary { .. } => "INVALID_SUMMARY",
            Self::Serialization { .. } => "SERIALIZATION",
        }
    }

    /// True when the caller may simply try the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

impl From<serde_json::Error> for EvchainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the evchain crates.
pub type EvchainResult<T> = Result<T, EvchainError>;
