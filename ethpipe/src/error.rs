use alloy::primitives::BlockNumber;

/// Result alias using [`Error`] as the default error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while turning RPC payloads into pipeline records.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The node returned transaction hashes where full transactions were
    /// requested.
    #[error("block {0} was returned without full transaction bodies")]
    HashesOnly(BlockNumber),
    /// The block timestamp does not fit a UTC date-time.
    #[error("block {block} has an out-of-range timestamp {timestamp}")]
    InvalidTimestamp {
        /// Block number.
        block: BlockNumber,
        /// Raw Unix timestamp from the header.
        timestamp: u64,
    },
    /// Network name not in the catalog.
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}
