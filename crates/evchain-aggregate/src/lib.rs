//! # evchain-aggregate
//!
//! Redacted, aggregate views of an evchain store.
//!
//! - `Aggregator::export` folds the events in a time range (optionally one
//!   actor's) through a set of `Accumulator`s into an `AggregateSummary`
//! - `Aggregator::snapshot` adds a SHA-256 digest of the canonical summary,
//!   identical for identical inputs
//! - `diff` / `render_text` compare two summaries without touching raw rows
//!
//! Summaries never contain event rows, only counters, breakdowns, and rates.

pub mod aggregator;
pub mod diff;
pub mod snapshot;
pub mod standard;

pub use aggregator::Aggregator;
pub use diff::{diff, render_text};
pub use snapshot::{load_summary, summary_digest, write_summary, Snapshot};
pub use standard::standard_accumulators;
