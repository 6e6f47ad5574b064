//! Block range fetching with retries and RPC fallback.
//!
//! Blocks are fetched one by one, in order, so the flattened rows come out
//! sorted by `(block_number, transaction_index)` without a sort pass.

use std::future::Future;
use std::ops::RangeInclusive;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use ethpipe::{Network, TransactionRecord};

use crate::source::BlockSource;

/// Attempts per block before the fetch is abandoned.
const MAX_ATTEMPTS: u32 = 3;

/// Progress is logged on every block number divisible by this.
const PROGRESS_INTERVAL: u64 = 5;

/// Delays applied between requests.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Pause after each successful block, to stay under provider rate limits.
    pub between_blocks: Duration,
    /// Pause before retrying a failed block.
    pub retry_backoff: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            between_blocks: Duration::from_millis(100),
            retry_backoff: Duration::from_secs(2),
        }
    }
}

impl Pacing {
    /// No delays at all.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            between_blocks: Duration::ZERO,
            retry_backoff: Duration::ZERO,
        }
    }
}

/// Rows fetched from a block range.
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    /// Flattened transactions in block order, then transaction order.
    pub rows: Vec<TransactionRecord>,
    /// Number of blocks fetched.
    pub blocks: u64,
}

/// The `n` most recent blocks ending at `latest`, clamped at genesis.
///
/// A window of zero is treated as one block.
#[must_use]
pub const fn block_range(latest: u64, n: u64) -> RangeInclusive<u64> {
    let span = if n == 0 { 0 } else { n - 1 };
    latest.saturating_sub(span)..=latest
}

/// Check that `source` serves `network`.
///
/// # Errors
///
/// Returns an error if the chain ID cannot be fetched or does not match.
pub async fn verify_network<S: BlockSource>(source: &S, network: Network) -> Result<()> {
    let chain_id = source.chain_id().await?;
    if chain_id != network.chain_id() {
        bail!(
            "RPC serves chain {chain_id}, expected {network} ({})",
            network.chain_id()
        );
    }
    Ok(())
}

/// Fetch every block in `[from, to]` and flatten its transactions.
///
/// # Errors
///
/// Returns an error if a block still fails after all retries, or if the
/// source reports that a block in the range does not exist.
pub async fn fetch_range<S: BlockSource>(
    source: &S,
    from: u64,
    to: u64,
    pacing: Pacing,
) -> Result<Fetched> {
    let mut fetched = Fetched::default();
    if from > to {
        return Ok(fetched);
    }

    tracing::info!(from, to, "fetching transactions");

    for number in from..=to {
        let block = fetch_block(source, number, pacing).await?;
        fetched.rows.extend(block.transactions);
        fetched.blocks += 1;

        if reports_progress(number, to) {
            tracing::info!(block = number, rows = fetched.rows.len(), "processed up to block");
        }
        if number < to && !pacing.between_blocks.is_zero() {
            tokio::time::sleep(pacing.between_blocks).await;
        }
    }

    Ok(fetched)
}

/// Whether a progress line is logged after `number` in a range ending at `to`.
const fn reports_progress(number: u64, to: u64) -> bool {
    number.is_multiple_of(PROGRESS_INTERVAL) || number == to
}

async fn fetch_block<S: BlockSource>(
    source: &S,
    number: u64,
    pacing: Pacing,
) -> Result<ethpipe::BlockRecord> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match source.block(number).await {
            Ok(Some(block)) => return Ok(block),
            Ok(None) => anyhow!("block {number} not found"),
            Err(e) => e,
        };
        if attempt >= MAX_ATTEMPTS {
            return Err(err.context(format!("block {number}: giving up after {attempt} attempts")));
        }
        tracing::warn!(block = number, attempt, error = %err, "retrying");
        if !pacing.retry_backoff.is_zero() {
            tokio::time::sleep(pacing.retry_backoff).await;
        }
    }
}

/// Run `f` against each RPC URL in turn until one succeeds.
///
/// # Errors
///
/// Returns the last error if every endpoint fails, or an error if `rpcs` is
/// empty.
pub async fn with_fallback<T, F, Fut>(rpcs: &[String], mut f: F) -> Result<T>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;

    for (i, rpc_url) in rpcs.iter().enumerate() {
        match f(rpc_url).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if let Some(next) = rpcs.get(i + 1) {
                    tracing::warn!(rpc = %rpc_url, next = %next, error = %e, "RPC failed, falling back");
                } else {
                    tracing::error!(rpc = %rpc_url, error = %e, "last RPC failed");
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("no RPC endpoints configured")))
}
