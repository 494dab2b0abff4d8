//! Time windows for retention and export.
//!
//! Windows are written compactly as `<n>d` or `<n>h` (for example `30d`,
//! `24h`), with `n > 0` and at most `MAX_WINDOW_DAYS` days.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EvchainError, EvchainResult};

/// Longest window `parse_window` accepts: one hundred years.
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Parse a compact window such as `7d` or `24h`.
pub fn parse_window(value: &str) -> EvchainResult<Duration> {
    let invalid = |reason: &str| EvchainError::InvalidWindow {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let normalized = value.trim().to_ascii_lowercase();
    let unit = normalized
        .chars()
        .last()
        .ok_or_else(|| invalid("window must be like 7d or 24h"))?;
    let digits = &normalized[..normalized.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("window must be like 7d or 24h"));
    }
    let amount: i64 = digits
        .parse()
        .map_err(|_| invalid("window amount is out of range"))?;
    if amount <= 0 {
        return Err(invalid("window amount must be > 0"));
    }

    let duration = match unit {
        'd' => Duration::try_days(amount),
        'h' => Duration::try_hours(amount),
        _ => return Err(invalid("window unit must be 'd' or 'h'")),
    };
    match duration {
        Some(d) if d <= Duration::days(MAX_WINDOW_DAYS) => Ok(d),
        _ => Err(invalid("window amount is out of range")),
    }
}

/// A purge request: remove rows older than `older_than`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    pub older_than: Duration,
}

impl RetentionWindow {
    pub fn days(days: u32) -> Self {
        Self {
            older_than: Duration::days(i64::from(days)),
        }
    }

    /// Rows with a timestamp strictly before this instant are expired.
    ///
    /// Windows reaching past the earliest representable instant clamp to it.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        earlier_by(now, self.older_than)
    }
}

impl FromStr for RetentionWindow {
    type Err = EvchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            older_than: parse_window(s)?,
        })
    }
}

/// Inclusive timestamp range for an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExportRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `window` ending at `now`, clamped like `RetentionWindow::cutoff`.
    pub fn trailing(window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            start: earlier_by(now, window),
            end: now,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

fn earlier_by(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
