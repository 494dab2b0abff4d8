//! # evchain-core
//!
//! Building blocks shared by the store and the aggregator:
//! - canonical JSON serialization and SHA-256 helpers (`canonical`)
//! - TOML configuration with documented defaults (`config`)
//! - the `EventLog` and `Accumulator` traits (`traits`)

pub mod canonical;
pub mod config;
pub mod traits;

pub use canonical::{canonical_digest, canonical_string, sha256_hex, to_canonical_string};
pub use config::{EvchainConfig, EventsConfig, SanitizerConfig, StoreConfig};
