//! # evchain-store
//!
//! Append-only, SHA-256 hash-chained event store on the local filesystem.
//!
//! ## Overview
//!
//! Each row commits to the hash of the row before it, so editing, inserting,
//! or deleting any row breaks the chain and is reported by `verify`. Every
//! mutation (`record`, `purge`, `rotate`) runs under one cross-process
//! `flock`, and the append path re-reads the tail under that lock, so
//! concurrent writers never fork the chain.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use evchain_contracts::event::{ActorKind, ActorRef, RawEvent};
//! use evchain_core::traits::EventLog;
//! use evchain_store::EventStore;
//!
//! let store = EventStore::open_default("/var/lib/evchain")?;
//! store.record(RawEvent::new("plan.generated", ActorRef::new(ActorKind::Human, "human:jordan"), "cli"))?;
//! assert!(store.verify()?.ok);
//! ```

pub mod chain;
pub mod intake;
pub mod lock;
pub mod retention;
pub mod scan;
pub mod store;

pub use chain::{content_hash, hash_event, next_row, verify_chain, ParsedLine};
pub use lock::{LockGuard, StoreLock};
pub use store::{read_events, EventStore};

// ── Tests ─────────────────────────────────────────────────────────────────────
