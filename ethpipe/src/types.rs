//! Flattened, chain-agnostic records produced by the pipeline.
//!
//! A [`BlockRecord`] holds one block fetched with full transaction bodies;
//! each [`TransactionRecord`] is a single output row. Conversion from the
//! alloy RPC types lives here so the rest of the pipeline never touches the
//! raw response shape.

use alloy::consensus::Transaction as ConsensusTransaction;
use alloy::network::TransactionResponse;
use alloy::primitives::{Address, B256, BlockNumber, U256};
use alloy::rpc::types::{Block, BlockTransactions, Transaction as RpcTransaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One transaction, flattened with the context of its enclosing block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Number of the block that includes the transaction.
    pub block_number: BlockNumber,
    /// Timestamp of the enclosing block.
    pub block_timestamp: DateTime<Utc>,
    /// Transaction hash.
    pub hash: B256,
    /// Sender.
    pub from: Address,
    /// Recipient; `None` for contract creation.
    pub to: Option<Address>,
    /// Transferred value in wei.
    pub value_wei: U256,
    /// Gas limit.
    pub gas: u64,
    /// EIP-1559 fee cap; `None` for legacy and access-list transactions.
    pub max_fee_per_gas: Option<u128>,
    /// EIP-1559 tip cap; `None` for legacy and access-list transactions.
    pub max_priority_fee_per_gas: Option<u128>,
    /// Sender nonce.
    pub nonce: u64,
    /// Position within the block.
    pub transaction_index: u64,
}

/// A block and its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Block number.
    pub number: BlockNumber,
    /// Block timestamp.
    pub timestamp: DateTime<Utc>,
    /// Transactions in block order.
    pub transactions: Vec<TransactionRecord>,
}

impl BlockRecord {
    /// Convert a block fetched with full transactions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HashesOnly`] if the block only carries transaction
    /// hashes, and [`Error::InvalidTimestamp`] if the header timestamp cannot
    /// be represented.
    pub fn from_rpc(block: &Block) -> Result<Self> {
        let number = block.header.number;
        let timestamp = timestamp_from_unix(number, block.header.timestamp)?;

        let txs: &[RpcTransaction] = match &block.transactions {
            BlockTransactions::Full(txs) => txs,
            BlockTransactions::Hashes(hashes) if hashes.is_empty() => &[],
            _ => return Err(Error::HashesOnly(number)),
        };

        let transactions = txs
            .iter()
            .enumerate()
            .map(|(position, tx)| TransactionRecord::from_rpc(tx, number, timestamp, position))
            .collect();

        Ok(Self {
            number,
            timestamp,
            transactions,
        })
    }

    /// Number of transactions in the block.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the block has no transactions.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl TransactionRecord {
    /// Flatten an RPC transaction.
    ///
    /// `position` is used as the transaction index when the node omits it.
    #[must_use]
    pub fn from_rpc(
        tx: &RpcTransaction,
        block_number: BlockNumber,
        block_timestamp: DateTime<Utc>,
        position: usize,
    ) -> Self {
        let dynamic = ConsensusTransaction::is_dynamic_fee(tx);
        Self {
            block_number,
            block_timestamp,
            hash: TransactionResponse::tx_hash(tx),
            from: TransactionResponse::from(tx),
            to: ConsensusTransaction::to(tx),
            value_wei: ConsensusTransaction::value(tx),
            gas: ConsensusTransaction::gas_limit(tx),
            max_fee_per_gas: dynamic.then(|| ConsensusTransaction::max_fee_per_gas(tx)),
            max_priority_fee_per_gas: if dynamic {
                ConsensusTransaction::max_priority_fee_per_gas(tx)
            } else {
                None
            },
            nonce: ConsensusTransaction::nonce(tx),
            transaction_index: TransactionResponse::transaction_index(tx)
                .unwrap_or(position as u64),
        }
    }

    /// Whether the transaction deploys a contract.
    #[must_use]
    pub const fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

fn timestamp_from_unix(block: BlockNumber, timestamp: u64) -> Result<DateTime<Utc>> {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or(Error::InvalidTimestamp { block, timestamp })
}

/// Flatten a sequence of blocks into transaction rows, preserving block
/// order and then transaction order.
#[must_use]
pub fn flatten(blocks: &[BlockRecord]) -> Vec<TransactionRecord> {
    blocks
        .iter()
        .flat_map(|b| b.transactions.iter().cloned())
        .collect()
}
