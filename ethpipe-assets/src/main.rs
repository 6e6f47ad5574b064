//! Ethereum transaction asset CLI.
//!
//! # Usage
//!
//! ```bash
//! # Snapshot the last 10 blocks (ETHEREUM_RPC_URL from the env or .env)
//! ethpipe-assets materialize ethereum_transactions_recent
//!
//! # Snapshot the last 50 blocks into ./out
//! ethpipe-assets materialize ethereum_transactions_recent --blocks 50 --data-dir ./out
//!
//! # Advance the incremental asset, trying two endpoints in order
//! ethpipe-assets materialize ethereum_transactions --rpc https://a.example --rpc https://b.example
//!
//! # Show the asset catalog
//! ethpipe-assets list
//!
//! # Preview a written file
//! ethpipe-assets inspect data/ethereum/transactions/tx_recent_until_21000000.parquet
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ethpipe_assets::assets::{self, Materialization, RunContext};
use ethpipe_assets::config::{DEFAULT_CONFIG_FILE, Overrides, Settings};
use ethpipe_assets::fetcher::{self, Pacing};
use ethpipe_assets::{parquet, preview, source};

/// Ethereum transaction assets.
#[derive(Debug, Parser)]
#[command(name = "ethpipe-assets", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Build an asset and write it to Parquet.
    Materialize {
        /// Asset name (see `list`).
        asset: String,

        /// Number of most recent blocks to scan (overrides `ETH_TX_RECENT_BLOCKS`).
        #[arg(long)]
        blocks: Option<u64>,

        /// Output root (overrides `ETHPIPE_DATA_DIR`).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// RPC endpoint; repeat to add fallbacks. Replaces `ETHEREUM_RPC_URL`
        /// and the config file list.
        #[arg(long = "rpc")]
        rpcs: Vec<String>,

        /// Config file.
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// List all known assets.
    List,

    /// Print a summary and preview of a written Parquet file.
    Inspect {
        /// Parquet file to read.
        file: PathBuf,

        /// Number of rows to preview.
        #[arg(long, default_value_t = preview::DEFAULT_PREVIEW_ROWS)]
        rows: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Materialize {
            asset,
            blocks,
            data_dir,
            rpcs,
            config,
        } => {
            let overrides = Overrides {
                rpcs,
                recent_blocks: blocks,
                data_dir,
            };
            cmd_materialize(&asset, &config, overrides).await
        }
        Command::List => {
            cmd_list();
            Ok(())
        }
        Command::Inspect { file, rows } => cmd_inspect(&file, rows),
    }
}

/// Execute the `materialize` subcommand.
async fn cmd_materialize(asset: &str, config: &Path, overrides: Overrides) -> Result<()> {
    let spec = assets::by_name(asset).with_context(|| format!("unknown asset {asset}"))?;
    let settings = Settings::load(config, overrides)?;

    let ctx = RunContext {
        data_dir: settings.data_dir.clone(),
        recent_blocks: settings.recent_blocks,
        max_blocks_per_run: settings.max_blocks_per_run,
        pacing: Pacing::default(),
    };

    tracing::info!(
        asset = spec.name,
        network = %settings.network,
        rpcs = settings.rpcs.len(),
        data_dir = %ctx.data_dir.display(),
        "starting materialization"
    );

    let (ctx, settings) = (&ctx, &settings);
    let materialization = fetcher::with_fallback(&settings.rpcs, |rpc| {
        let rpc = rpc.to_owned();
        async move {
            tracing::info!(rpc = %rpc, "connecting");
            let source = source::connect_http(&rpc, settings.request_timeout)?;
            fetcher::verify_network(&source, settings.network).await?;
            assets::materialize(spec, &source, ctx).await
        }
    })
    .await?;

    print_materialization(&materialization);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_materialization(m: &Materialization) {
    println!("asset:            {}", m.asset);
    println!("latest_block:     {}", m.latest_block);
    println!("blocks_scanned:   {}", m.blocks_scanned);
    if let Some(first) = m.first_block {
        println!("first_block:      {first}");
    }
    println!("num_transactions: {}", m.num_transactions);
    match &m.file {
        Some(file) => println!("file:             {}", file.display()),
        None => println!("file:             (up to date, nothing written)"),
    }
    println!();
    println!("{}", m.preview);
}

/// Execute the `list` subcommand.
#[allow(clippy::print_stdout)]
fn cmd_list() {
    println!(
        "{:<32} {:<10} {:<8} Description",
        "Asset", "Group", "Kind"
    );
    println!("{}", "-".repeat(100));

    for asset in assets::ALL {
        println!(
            "{:<32} {:<10} {:<8} {}",
            asset.name, asset.group, asset.compute_kind, asset.description,
        );
    }
}

/// Execute the `inspect` subcommand.
#[allow(clippy::print_stdout)]
fn cmd_inspect(file: &Path, rows: usize) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("{} does not exist", file.display());
    }
    let batches = parquet::read(file)?;
    let mut records = Vec::new();
    for batch in &batches {
        records.extend(parquet::batch_to_records(batch)?);
        if records.len() >= rows {
            break;
        }
    }

    println!("file:             {}", file.display());
    println!("num_transactions: {}", parquet::row_count(&batches));
    match parquet::block_span(&batches) {
        Some((lo, hi)) => println!("blocks:           {lo}..={hi}"),
        None => println!("blocks:           (none)"),
    }

    let sidecar = Materialization::metadata_path(file);
    if sidecar.exists() {
        let m = Materialization::load(&sidecar)?;
        println!("asset:            {}", m.asset);
        println!("materialized_at:  {}", m.materialized_at.to_rfc3339());
    }

    println!();
    println!("{}", preview::markdown(&records, rows));
    Ok(())
}
