//! Range- and actor-filtered export over a store and its archives.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use evchain_contracts::{
    error::EvchainResult,
    event::Event,
    summary::{AggregateSummary, Tally, SUMMARY_SCHEMA_VERSION},
    window::ExportRange,
};
use evchain_core::traits::Accumulator;
use evchain_store::{read_events, EventStore};

use crate::snapshot::Snapshot;
use crate::standard::standard_accumulators;

type AccumulatorSet = Box<dyn Fn() -> Vec<Box<dyn Accumulator>> + Send + Sync>;

/// Folds the events of one store into an `AggregateSummary`.
///
/// Each export starts from a fresh accumulator set, so one `Aggregator` can
/// serve any number of exports.
pub struct Aggregator<'a> {
    store: &'a EventStore,
    accumulators: AccumulatorSet,
}

impl<'a> Aggregator<'a> {
    /// Aggregate with the standard runner accumulators.
    pub fn new(store: &'a EventStore) -> Self {
        Self::with_accumulators(store, standard_accumulators)
    }

    /// Aggregate with a caller-supplied accumulator set.
    pub fn with_accumulators<F>(store: &'a EventStore, make: F) -> Self
    where
        F: Fn() -> Vec<Box<dyn Accumulator>> + Send + Sync + 'static,
    {
        Self {
            store,
            accumulators: Box::new(make),
        }
    }

    /// Summarize every event with `ts` inside `range` (inclusive), optionally
    /// only those of one actor.
    ///
    /// Archives are scanned too when the range reaches back before the oldest
    /// row of the active store. Rows that do not parse, or whose `ts` does
    /// not, are skipped.
    pub fn export(&self, range: ExportRange, actor_id: Option<&str>) -> EvchainResult<AggregateSummary> {
        let actor_filter = actor_id.map(|id| self.store.sanitizer().sanitize_identifier(Some(id), "").0);

        let active = read_events(self.store.events_path())?;
        let mut sources: Vec<Vec<Event>> = Vec::new();
        if reaches_before(range.start, &active) {
            for archive in self.store.archive_files()? {
                debug!(archive = %archive.display(), "including archive in export");
                sources.push(read_events(&archive)?);
            }
        }
        sources.push(active);

        let mut accumulators = (self.accumulators)();
        let mut considered: i64 = 0;
        for event in sources.iter().flatten() {
            let in_range = event.timestamp().is_some_and(|ts| range.contains(ts));
            let actor_matches = actor_filter.as_deref().map_or(true, |id| event.actor.id == id);
            if !(in_range && actor_matches) {
                continue;
            }
            considered += 1;
            for accumulator in accumulators.iter_mut() {
                accumulator.observe(event);
            }
        }

        let mut tally = Tally::default();
        for accumulator in &accumulators {
            accumulator.emit(&mut tally);
        }

        info!(
            events_considered = considered,
            start = %range.start,
            end = %range.end,
            "exported summary"
        );
        Ok(AggregateSummary {
            schema_version: SUMMARY_SCHEMA_VERSION.to_string(),
            window_start: range.start,
            window_end: range.end,
            actor_id_filter: actor_filter,
            events_considered: considered,
            tally,
        })
    }

    /// Export plus the digest of the canonical summary.
    pub fn snapshot(&self, range: ExportRange, actor_id: Option<&str>) -> EvchainResult<Snapshot> {
        Snapshot::of(self.export(range, actor_id)?)
    }
}

/// True when the active store is empty or `start` predates its oldest row.
fn reaches_before(start: DateTime<Utc>, active: &[Event]) -> bool {
    match active.iter().filter_map(Event::timestamp).min() {
        Some(oldest) => start < oldest,
        None => true,
    }
}
