//! Trait seams between the log and its collaborators.
//!
//! - `EventLog`: the narrow surface collaborators write through
//! - `Accumulator`: one pluggable counter set folded over exported events
//!
//! Collaborators (CLI, local API, tool bridge) only ever see these traits
//! and the contract types; they never touch the store file directly.

use evchain_contracts::{
    error::EvchainResult,
    event::{Event, RawEvent, StoredRow},
    report::{PurgeReport, VerificationReport},
    summary::Tally,
    window::RetentionWindow,
};

/// A tamper-evident, append-only event log.
///
/// Every mutation (`record`, `purge`) is serialized through one
/// cross-process lock. Reads (`tail`, `verify`) take no lock.
pub trait EventLog: Send + Sync {
    /// Sanitize, hash, and durably append one event.
    ///
    /// If sanitization altered the payload, a `risk.flagged` companion is
    /// appended directly after it while the same lock is held. Returns the
    /// stored primary row.
    fn record(&self, event: RawEvent) -> EvchainResult<StoredRow>;

    /// The last complete row of the store, if any.
    fn tail(&self) -> EvchainResult<Option<StoredRow>>;

    /// Check every row's linkage and hash. Never stops at the first problem.
    fn verify(&self) -> EvchainResult<VerificationReport>;

    /// Archive the leading run of rows older than `window` and re-anchor the
    /// rest of the chain at the genesis sentinel.
    fn purge(&self, window: RetentionWindow) -> EvchainResult<PurgeReport>;
}

/// One extensible counter set computed during an export scan.
///
/// Accumulators receive every in-range, actor-filtered event in file order
/// and must tolerate any `event_type` and any `data` shape.
pub trait Accumulator: Send {
    /// Fold one event into the accumulator's state.
    fn observe(&mut self, event: &Event);

    /// Write the accumulated numbers into `tally`.
    ///
    /// Implementations should emit every counter and breakdown they own even
    /// when nothing was observed, so summaries keep a stable shape.
    fn emit(&self, tally: &mut Tally);
}
