//! Deltas between two summaries and their text rendering.
//!
//! Only numbers are compared; no raw events are needed.

use std::collections::BTreeMap;
use std::fmt::Write;

use evchain_contracts::summary::{round_rate, union_keys, AggregateSummary, DeltaReport, SUMMARY_SCHEMA_VERSION};

/// `b - a` for every counter, breakdown entry, and rate in either summary.
///
/// A key missing from one side counts as zero there.
pub fn diff(a: &AggregateSummary, b: &AggregateSummary) -> DeltaReport {
    DeltaReport {
        schema_version: SUMMARY_SCHEMA_VERSION.to_string(),
        baseline_a_window: (a.window_start, a.window_end),
        baseline_b_window: (b.window_start, b.window_end),
        events_considered_delta: b.events_considered.saturating_sub(a.events_considered),
        counters: subtract(&a.tally.counters, &b.tally.counters),
        breakdowns: union_keys(&a.tally.breakdowns, &b.tally.breakdowns)
            .into_iter()
            .map(|name| {
                let empty = BTreeMap::new();
                let left = a.tally.breakdowns.get(name).unwrap_or(&empty);
                let right = b.tally.breakdowns.get(name).unwrap_or(&empty);
                (name.clone(), subtract(left, right))
            })
            .collect(),
        rates: union_keys(&a.tally.rates, &b.tally.rates)
            .into_iter()
            .map(|name| {
                let left = a.tally.rates.get(name).copied().unwrap_or(0.0);
                let right = b.tally.rates.get(name).copied().unwrap_or(0.0);
                (name.clone(), round_rate(right - left))
            })
            .collect(),
    }
}

fn subtract(a: &BTreeMap<String, i64>, b: &BTreeMap<String, i64>) -> BTreeMap<String, i64> {
    union_keys(a, b)
        .into_iter()
        .map(|key| {
            let left = a.get(key).copied().unwrap_or(0);
            let right = b.get(key).copied().unwrap_or(0);
            (key.clone(), right.saturating_sub(left))
        })
        .collect()
}

/// How many breakdown entries `render_text` lists.
const TOP_BREAKDOWN_DELTAS: usize = 5;

/// Compact human-readable rendering; zero deltas are omitted.
pub fn render_text(report: &DeltaReport) -> String {
    let mut out = String::new();
    let (a_start, a_end) = report.baseline_a_window;
    let (b_start, b_end) = report.baseline_b_window;
    // Writing into a String cannot fail.
    let _ = writeln!(out, "Baseline A: {} .. {}", a_start.to_rfc3339(), a_end.to_rfc3339());
    let _ = writeln!(out, "Baseline B: {} .. {}", b_start.to_rfc3339(), b_end.to_rfc3339());
    let _ = writeln!(out, "Events considered delta: {:+}", report.events_considered_delta);

    if report.is_zero() {
        out.push_str("No changes.");
        return out;
    }

    let counters: Vec<_> = report.counters.iter().filter(|(_, d)| **d != 0).collect();
    if !counters.is_empty() {
        out.push_str("Counter deltas:\n");
        for (name, delta) in counters {
            let _ = writeln!(out, "- {}: {:+}", name, delta);
        }
    }

    let rates: Vec<_> = report.rates.iter().filter(|(_, d)| **d != 0.0).collect();
    if !rates.is_empty() {
        out.push_str("Rate deltas:\n");
        for (name, delta) in rates {
            let _ = writeln!(out, "- {}: {:+.4}", name, delta);
        }
    }

    let mut entries: Vec<(String, i64)> = report
        .breakdowns
        .iter()
        .flat_map(|(name, keys)| {
            keys.iter()
                .filter(|(_, d)| **d != 0)
                .map(move |(key, d)| (format!("{}/{}", name, key), *d))
        })
        .collect();
    if !entries.is_empty() {
        entries.sort_by(|(ka, da), (kb, db)| db.abs().cmp(&da.abs()).then_with(|| ka.cmp(kb)));
        out.push_str("Top breakdown deltas:\n");
        for (key, delta) in entries.iter().take(TOP_BREAKDOWN_DELTAS) {
            let _ = writeln!(out, "- {}: {:+}", key, delta);
        }
    }

    out.trim_end().to_string()
}
