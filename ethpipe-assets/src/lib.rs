//! Ethereum transaction assets.
//!
//! Fetches blocks with full transactions over JSON-RPC, flattens them into
//! one row per transaction and stores the rows as Parquet, either as a
//! snapshot of the most recent blocks or as a cursor-driven incremental
//! backfill.

pub mod assets;
pub mod config;
pub mod cursor;
pub mod fetcher;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod parquet;
pub mod preview;
pub mod source;
