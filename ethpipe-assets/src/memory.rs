//! In-memory [`BlockSource`] test helper.
//!
//! Built for unit tests and, with the `test-utils` feature, for downstream
//! and integration tests. The CLI never uses it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use alloy::primitives::{Address, U256, keccak256};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use ethpipe::{BlockRecord, TransactionRecord};

use crate::source::BlockSource;

/// Seconds between synthetic blocks.
const SLOT_SECONDS: i64 = 12;

/// Timestamp of synthetic block zero (2023-11-14T22:13:20Z).
const GENESIS_TIMESTAMP: i64 = 1_700_000_000;

/// A chain held in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    chain_id: u64,
    blocks: BTreeMap<u64, BlockRecord>,
    fail_first: u32,
    requests: AtomicU32,
}

impl MemorySource {
    /// An empty chain.
    #[must_use]
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            ..Self::default()
        }
    }

    /// A synthetic chain with blocks `0..=latest`, each carrying
    /// `txs_per_block` transactions.
    #[must_use]
    pub fn chain(chain_id: u64, latest: u64, txs_per_block: u64) -> Self {
        (0..=latest).fold(Self::new(chain_id), |source, number| {
            source.with_block(synthetic_block(number, txs_per_block))
        })
    }

    /// Add or replace a block.
    #[must_use]
    pub fn with_block(mut self, block: BlockRecord) -> Self {
        self.blocks.insert(block.number, block);
        self
    }

    /// Make the first `n` block requests fail.
    #[must_use]
    pub const fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    /// Number of block requests served so far, failed ones included.
    #[must_use]
    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

impl BlockSource for MemorySource {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    async fn latest_block_number(&self) -> Result<u64> {
        match self.blocks.last_key_value() {
            Some((number, _)) => Ok(*number),
            None => bail!("chain has no blocks"),
        }
    }

    async fn block(&self, number: u64) -> Result<Option<BlockRecord>> {
        let seen = self.requests.fetch_add(1, Ordering::SeqCst);
        if seen < self.fail_first {
            bail!("simulated RPC failure #{}", seen + 1);
        }
        Ok(self.blocks.get(&number).cloned())
    }
}

/// Build a deterministic block.
///
/// Even-indexed transactions use EIP-1559 fees; every seventh
/// `(number + index)` is a contract creation.
#[must_use]
pub fn synthetic_block(number: u64, txs: u64) -> BlockRecord {
    let timestamp = synthetic_timestamp(number);
    let transactions = (0..txs)
        .map(|index| {
            let dynamic = index % 2 == 0;
            TransactionRecord {
                block_number: number,
                block_timestamp: timestamp,
                hash: keccak256(format!("{number}:{index}")),
                from: Address::with_last_byte(u8::try_from(index % 256).unwrap_or_default()),
                to: (!(number + index).is_multiple_of(7)).then(|| Address::repeat_byte(0xee)),
                value_wei: U256::from(number) * U256::from(10u64.pow(15)),
                gas: 21_000,
                max_fee_per_gas: dynamic.then_some(30_000_000_000),
                max_priority_fee_per_gas: dynamic.then_some(1_000_000_000),
                nonce: index,
                transaction_index: index,
            }
        })
        .collect();

    BlockRecord {
        number,
        timestamp,
        transactions,
    }
}

fn synthetic_timestamp(number: u64) -> DateTime<Utc> {
    i64::try_from(number)
        .ok()
        .and_then(|n| n.checked_mul(SLOT_SECONDS))
        .and_then(|offset| offset.checked_add(GENESIS_TIMESTAMP))
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_default()
}
