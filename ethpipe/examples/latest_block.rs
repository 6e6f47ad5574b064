#![allow(clippy::print_stdout)]
//! Fetch the latest block and print its flattened transactions.
//!
//! Usage:
//!   cargo run --example `latest_block` -- [RPC URL]
//!
//! Falls back to the public mainnet endpoint when no URL is given.

use alloy::eips::BlockNumberOrTag;
use alloy::providers::{Provider, ProviderBuilder};
use ethpipe::{BlockRecord, Network};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rpc = std::env::args()
        .nth(1)
        .unwrap_or_else(|| Network::EthereumMainnet.public_rpc().to_owned());
    let provider = ProviderBuilder::new().connect_http(rpc.parse()?);

    let chain_id = provider.get_chain_id().await?;
    let network = Network::from_chain_id(chain_id)
        .map_or_else(|| format!("chain {chain_id}"), |n| n.to_string());

    let Some(block) = provider
        .get_block_by_number(BlockNumberOrTag::Latest)
        .full()
        .await?
    else {
        println!("[{network}] node returned no latest block");
        return Ok(());
    };

    let record = BlockRecord::from_rpc(&block)?;
    println!(
        "[{network}] block {} at {} with {} transactions",
        record.number,
        record.timestamp.to_rfc3339(),
        record.len()
    );
    for tx in record.transactions.iter().take(5) {
        println!(
            "  #{:<4} {:#x} {} -> {} ({} wei)",
            tx.transaction_index,
            tx.hash,
            tx.from,
            tx.to.map_or_else(|| "<create>".to_owned(), |a| a.to_string()),
            tx.value_wei,
        );
    }

    Ok(())
}
