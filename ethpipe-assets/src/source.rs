//! Where blocks come from.
//!
//! [`BlockSource`] is the seam between the pipeline and a node. The
//! production implementation, [`RpcSource`], wraps an alloy HTTP provider;
//! anything that can answer "latest block" and "block N" works.

use std::future::Future;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{Context, Result};
use ethpipe::BlockRecord;

/// A read-only view of a chain.
pub trait BlockSource {
    /// EIP-155 chain ID served by this source.
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Number of the current chain head.
    fn latest_block_number(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Fetch a block with its full transactions.
    ///
    /// Returns `Ok(None)` if the source does not have the block.
    fn block(&self, number: u64) -> impl Future<Output = Result<Option<BlockRecord>>> + Send;
}

/// JSON-RPC backed [`BlockSource`].
#[derive(Debug, Clone)]
pub struct RpcSource<P> {
    provider: P,
    timeout: Duration,
}

/// Connect to an HTTP JSON-RPC endpoint.
///
/// # Errors
///
/// Returns an error if `url` is not a valid URL.
pub fn connect_http(url: &str, timeout: Duration) -> Result<RpcSource<impl Provider>> {
    let provider = ProviderBuilder::new()
        .connect_http(url.parse().with_context(|| format!("invalid RPC URL: {url}"))?);
    Ok(RpcSource::new(provider, timeout))
}

impl<P: Provider> RpcSource<P> {
    /// Wrap an existing provider.
    pub const fn new(provider: P, timeout: Duration) -> Self {
        Self { provider, timeout }
    }
}

impl<P: Provider> BlockSource for RpcSource<P> {
    async fn chain_id(&self) -> Result<u64> {
        tokio::time::timeout(self.timeout, self.provider.get_chain_id())
            .await
            .context("eth_chainId timed out")?
            .context("eth_chainId failed")
    }

    async fn latest_block_number(&self) -> Result<u64> {
        tokio::time::timeout(self.timeout, self.provider.get_block_number())
            .await
            .context("eth_blockNumber timed out")?
            .context("eth_blockNumber failed")
    }

    async fn block(&self, number: u64) -> Result<Option<BlockRecord>> {
        let request = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .full();
        let block = tokio::time::timeout(self.timeout, request)
            .await
            .with_context(|| format!("eth_getBlockByNumber({number}) timed out"))?
            .with_context(|| format!("eth_getBlockByNumber({number}) failed"))?;

        block
            .map(|b| BlockRecord::from_rpc(&b))
            .transpose()
            .with_context(|| format!("converting block {number}"))
    }
}
