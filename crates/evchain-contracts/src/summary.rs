//! Aggregate summaries and the deltas between them.
//!
//! A summary holds only accumulated numbers keyed by name, never raw rows.
//! The shape is generic (`counters`, `breakdowns`, `rates`) so that new
//! accumulators can add counters without a schema change and `diff` can
//! compare any two summaries without knowing what the counters mean.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format revision of `AggregateSummary` and `DeltaReport` documents.
pub const SUMMARY_SCHEMA_VERSION: &str = "0.1";

/// Round a rate to four decimal places.
pub fn round_rate(value: f64) -> f64 {
    if value.is_finite() {
        (value * 10_000.0).round() / 10_000.0
    } else {
        0.0
    }
}

/// Named numbers produced by accumulators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
    #[serde(default)]
    pub breakdowns: BTreeMap<String, BTreeMap<String, i64>>,
    #[serde(default)]
    pub rates: BTreeMap<String, f64>,
}

impl Tally {
    pub fn set_counter(&mut self, name: &str, value: i64) {
        self.counters.insert(name.to_string(), value);
    }

    /// Ensure a breakdown exists (possibly empty) and return it.
    pub fn breakdown(&mut self, name: &str) -> &mut BTreeMap<String, i64> {
        self.breakdowns.entry(name.to_string()).or_default()
    }

    /// Add `by` to one breakdown entry, saturating at the `i64` bounds.
    pub fn bump(&mut self, breakdown: &str, key: &str, by: i64) {
        let slot = self.breakdown(breakdown).entry(key.to_string()).or_insert(0);
        *slot = slot.saturating_add(by);
    }

    /// Store a rate rounded to four decimal places.
    pub fn set_rate(&mut self, name: &str, value: f64) {
        self.rates.insert(name.to_string(), round_rate(value));
    }
}

/// A redacted, aggregate view of the log over a time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub schema_version: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub actor_id_filter: Option<String>,
    pub events_considered: i64,
    #[serde(flatten)]
    pub tally: Tally,
}

/// Difference `b - a` between two summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaReport {
    pub schema_version: String,
    pub baseline_a_window: (DateTime<Utc>, DateTime<Utc>),
    pub baseline_b_window: (DateTime<Utc>, DateTime<Utc>),
    pub events_considered_delta: i64,
    pub counters: BTreeMap<String, i64>,
    pub breakdowns: BTreeMap<String, BTreeMap<String, i64>>,
    pub rates: BTreeMap<String, f64>,
}

impl DeltaReport {
    /// True when every delta in the report is zero.
    pub fn is_zero(&self) -> bool {
        self.events_considered_delta == 0
            && self.counters.values().all(|v| *v == 0)
            && self
                .breakdowns
                .values()
                .all(|b| b.values().all(|v| *v == 0))
            && self.rates.values().all(|v| *v == 0.0)
    }
}

/// Union of the keys of two ordered maps, in order.
pub fn union_keys<'a, V>(
    a: &'a BTreeMap<String, V>,
    b: &'a BTreeMap<String, V>,
) -> BTreeSet<&'a String> {
    a.keys().chain(b.keys()).collect()
}
