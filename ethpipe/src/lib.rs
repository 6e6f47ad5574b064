//! Core types for the ethpipe Ethereum data pipeline.
//!
//! - [`Network`]: the Ethereum networks the pipeline knows about.
//! - [`BlockRecord`] / [`TransactionRecord`]: flattened records built from
//!   alloy RPC responses, ready to be written as columnar data.

mod error;
pub mod networks;
pub mod types;

pub use error::{Error, Result};
pub use networks::Network;
pub use types::{BlockRecord, TransactionRecord, flatten};
