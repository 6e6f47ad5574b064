//! Asset catalog and materialization.
//!
//! An asset is a named dataset that can be (re)built on demand. Each
//! materialization writes one Parquet file and a `<file>.meta.json` sidecar
//! describing what was produced.
//!
//! Output layout:
//! ```text
//! <data_dir>/ethereum/transactions/
//!   ├── tx_recent_until_<latest>.parquet
//!   ├── tx_recent_until_<latest>.parquet.meta.json
//!   └── incremental/
//!       ├── cursor.json
//!       ├── tx_<from>_<to>.parquet
//!       └── tx_<from>_<to>.parquet.meta.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::fetcher::{self, Pacing};
use crate::parquet;
use crate::preview;
use crate::source::BlockSource;

/// Which materialization routine backs an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Snapshot of the most recent blocks.
    RecentTransactions,
    /// Append-only, cursor-driven backfill toward the chain head.
    IncrementalTransactions,
}

/// Static description of an asset.
#[derive(Debug, Clone, Copy)]
pub struct AssetSpec {
    /// Unique asset name.
    pub name: &'static str,
    /// Group the asset belongs to.
    pub group: &'static str,
    /// Technology used to compute it.
    pub compute_kind: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Materialization routine.
    pub kind: AssetKind,
}

/// All known assets.
pub const ALL: &[AssetSpec] = &[
    AssetSpec {
        name: "ethereum_transactions_recent",
        group: "ethereum",
        compute_kind: "alloy",
        description: "Fetch transactions from the last N blocks and write them to Parquet.",
        kind: AssetKind::RecentTransactions,
    },
    AssetSpec {
        name: "ethereum_transactions",
        group: "ethereum",
        compute_kind: "alloy",
        description: "Append transactions from the last checkpoint up to the chain head to Parquet.",
        kind: AssetKind::IncrementalTransactions,
    },
];

/// Look up an [`AssetSpec`] by name.
#[must_use]
pub fn by_name(name: &str) -> Option<&'static AssetSpec> {
    ALL.iter().find(|a| a.name == name)
}

/// Inputs shared by every materialization.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Output root.
    pub data_dir: PathBuf,
    /// Recent-block window.
    pub recent_blocks: u64,
    /// Upper bound on blocks fetched by one incremental run.
    pub max_blocks_per_run: u64,
    /// Request pacing.
    pub pacing: Pacing,
}

/// Metadata describing one materialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Materialization {
    /// Asset name.
    pub asset: String,
    /// Number of blocks fetched.
    pub blocks_scanned: u64,
    /// First block fetched, if any.
    pub first_block: Option<u64>,
    /// Chain head observed at the start of the run.
    pub latest_block: u64,
    /// Rows written.
    pub num_transactions: usize,
    /// Markdown table of the first rows.
    pub preview: String,
    /// Parquet file written, if any.
    pub file: Option<PathBuf>,
    /// When the materialization finished.
    pub materialized_at: DateTime<Utc>,
}

impl Materialization {
    /// Sidecar path for a data file.
    #[must_use]
    pub fn metadata_path(file: &Path) -> PathBuf {
        let mut name = file.as_os_str().to_owned();
        name.push(".meta.json");
        PathBuf::from(name)
    }

    /// Write the sidecar next to [`Materialization::file`]. No-op when no
    /// file was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the sidecar cannot be written.
    pub fn save(&self) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let path = Self::metadata_path(file);
        let tmp = path.with_extension("json.tmp");

        std::fs::write(&tmp, serde_json::to_string_pretty(self)?.as_bytes())
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))
    }

    /// Read a sidecar.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let data =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Directory holding all transaction assets.
#[must_use]
pub fn transactions_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("ethereum").join("transactions")
}

/// Directory holding the incremental transaction asset and its cursor.
#[must_use]
pub fn incremental_dir(data_dir: &Path) -> PathBuf {
    transactions_dir(data_dir).join("incremental")
}

/// Materialize `spec` from `source`.
///
/// # Errors
///
/// Returns an error if fetching or writing fails.
pub async fn materialize<S: BlockSource>(
    spec: &AssetSpec,
    source: &S,
    ctx: &RunContext,
) -> Result<Materialization> {
    tracing::info!(asset = spec.name, group = spec.group, "materializing");
    let result = match spec.kind {
        AssetKind::RecentTransactions => recent_transactions(spec, source, ctx).await,
        AssetKind::IncrementalTransactions => incremental_transactions(spec, source, ctx).await,
    };
    result.with_context(|| format!("materializing {}", spec.name))
}

async fn recent_transactions<S: BlockSource>(
    spec: &AssetSpec,
    source: &S,
    ctx: &RunContext,
) -> Result<Materialization> {
    let latest = source.latest_block_number().await?;
    let range = fetcher::block_range(latest, ctx.recent_blocks);
    let from = *range.start();

    let fetched = fetcher::fetch_range(source, from, latest, ctx.pacing).await?;

    let path = transactions_dir(&ctx.data_dir).join(format!("tx_recent_until_{latest}.parquet"));
    parquet::write_records(&path, &fetched.rows)?;

    finish(spec, fetched, from, latest, path)
}

async fn incremental_transactions<S: BlockSource>(
    spec: &AssetSpec,
    source: &S,
    ctx: &RunContext,
) -> Result<Materialization> {
    let dir = incremental_dir(&ctx.data_dir);
    let latest = source.latest_block_number().await?;

    let checkpoint = Cursor::load(&dir)?.map(|c| c.last_block);
    let written = last_written_block(&dir)?;
    if let Some((w, c)) = written.zip(checkpoint).filter(|(w, c)| w > c) {
        tracing::warn!(cursor = c, written = w, "output ahead of cursor, resuming after output");
    }

    // Nothing follows a checkpoint at u64::MAX.
    let next = match checkpoint.max(written) {
        Some(last) => last.checked_add(1),
        None => Some(*fetcher::block_range(latest, ctx.recent_blocks).start()),
    };
    let Some(from) = next.filter(|&from| from <= latest) else {
        tracing::info!(asset = spec.name, latest, "already up to date");
        return Ok(Materialization {
            asset: spec.name.to_owned(),
            blocks_scanned: 0,
            first_block: None,
            latest_block: latest,
            num_transactions: 0,
            preview: preview::NO_ROWS.to_owned(),
            file: None,
            materialized_at: Utc::now(),
        });
    };
    let to = latest.min(from.saturating_add(ctx.max_blocks_per_run.saturating_sub(1)));
    if to < latest {
        tracing::info!(asset = spec.name, from, to, latest, "capping run, more blocks remain");
    }

    let fetched = fetcher::fetch_range(source, from, to, ctx.pacing).await?;

    let path = dir.join(format!("tx_{from}_{to}.parquet"));
    parquet::write_records(&path, &fetched.rows)?;
    let materialization = finish(spec, fetched, from, latest, path)?;

    Cursor::now(to).save(&dir)?;
    tracing::info!(asset = spec.name, last_block = to, "cursor updated");
    Ok(materialization)
}

fn finish(
    spec: &AssetSpec,
    fetched: fetcher::Fetched,
    from: u64,
    latest: u64,
    path: PathBuf,
) -> Result<Materialization> {
    let materialization = Materialization {
        asset: spec.name.to_owned(),
        blocks_scanned: fetched.blocks,
        first_block: Some(from),
        latest_block: latest,
        num_transactions: fetched.rows.len(),
        preview: preview::markdown(&fetched.rows, preview::DEFAULT_PREVIEW_ROWS),
        file: Some(path),
        materialized_at: Utc::now(),
    };
    materialization.save()?;

    tracing::info!(
        asset = spec.name,
        blocks = materialization.blocks_scanned,
        transactions = materialization.num_transactions,
        file = ?materialization.file,
        "materialized"
    );
    Ok(materialization)
}

/// Highest `<to>` among `tx_<from>_<to>.parquet` files in `dir`.
fn last_written_block(dir: &Path) -> Result<Option<u64>> {
    if !dir.exists() {
        return Ok(None);
    }
    let mut last = None;
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let name = entry?.file_name();
        let Some(to) = name.to_str().and_then(parse_incremental_name).map(|(_, to)| to) else {
            continue;
        };
        last = last.max(Some(to));
    }
    Ok(last)
}

/// Parse `tx_<from>_<to>.parquet`.
fn parse_incremental_name(name: &str) -> Option<(u64, u64)> {
    let (from, to) = name
        .strip_prefix("tx_")?
        .strip_suffix(".parquet")?
        .split_once('_')?;
    Some((from.parse().ok()?, to.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySource;

    fn ctx(data_dir: &Path) -> RunContext {
        RunContext {
            data_dir: data_dir.to_path_buf(),
            recent_blocks: 10,
            max_blocks_per_run: 1_000,
            pacing: Pacing::none(),
        }
    }

    fn recent() -> &'static AssetSpec {
        by_name("ethereum_transactions_recent").unwrap()
    }

    fn incremental() -> &'static AssetSpec {
        by_name("ethereum_transactions").unwrap()
    }

    #[test]
    fn catalog_names_are_unique() {
        for (i, a) in ALL.iter().enumerate() {
            assert!(
                ALL.iter().skip(i + 1).all(|b| b.name != a.name),
                "duplicate asset {}",
                a.name
            );
        }
        assert!(by_name("nope").is_none(), "unknown asset");
    }

    #[test]
    fn incremental_names_parse() {
        assert_eq!(parse_incremental_name("tx_10_20.parquet"), Some((10, 20)));
        assert_eq!(parse_incremental_name("tx_recent_until_20.parquet"), None);
        assert_eq!(parse_incremental_name("tx_10_20.parquet.meta.json"), None);
        assert_eq!(parse_incremental_name("cursor.json"), None);
    }

    #[test]
    fn metadata_path_appends_suffix() {
        assert_eq!(
            Materialization::metadata_path(Path::new("/d/tx_1_2.parquet")),
            PathBuf::from("/d/tx_1_2.parquet.meta.json")
        );
    }

    #[tokio::test]
    async fn recent_writes_window_ending_at_head() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::chain(1, 100, 2);

        let m = materialize(recent(), &source, &ctx(dir.path())).await.unwrap();

        assert_eq!(m.asset, "ethereum_transactions_recent");
        assert_eq!(m.latest_block, 100);
        assert_eq!(m.first_block, Some(91));
        assert_eq!(m.blocks_scanned, 10);
        assert_eq!(m.num_transactions, 20);

        let file = m.file.clone().unwrap();
        assert_eq!(
            file,
            transactions_dir(dir.path()).join("tx_recent_until_100.parquet")
        );
        let batches = parquet::read(&file).unwrap();
        assert_eq!(parquet::block_span(&batches), Some((91, 100)));
        assert_eq!(Materialization::load(&Materialization::metadata_path(&file)).unwrap(), m);
    }

    #[tokio::test]
    async fn recent_window_clamps_at_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::chain(1, 3, 1);

        let m = materialize(recent(), &source, &ctx(dir.path())).await.unwrap();
        assert_eq!(m.first_block, Some(0));
        assert_eq!(m.blocks_scanned, 4);
    }

    #[tokio::test]
    async fn recent_with_empty_blocks_writes_placeholder_preview() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::chain(1, 50, 0);

        let m = materialize(recent(), &source, &ctx(dir.path())).await.unwrap();
        assert_eq!(m.num_transactions, 0);
        assert_eq!(m.preview, preview::NO_ROWS);
        assert!(m.file.unwrap().exists(), "empty file is still written");
    }

    #[tokio::test]
    async fn incremental_starts_at_window_then_resumes_from_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let context = ctx(dir.path());

        let first = materialize(incremental(), &MemorySource::chain(1, 100, 1), &context)
            .await
            .unwrap();
        assert_eq!(first.first_block, Some(91));
        assert_eq!(
            Cursor::load(&incremental_dir(dir.path())).unwrap().unwrap().last_block,
            100
        );

        let second = materialize(incremental(), &MemorySource::chain(1, 104, 1), &context)
            .await
            .unwrap();
        assert_eq!(second.first_block, Some(101));
        assert_eq!(second.blocks_scanned, 4);
        assert_eq!(
            second.file.unwrap(),
            incremental_dir(dir.path()).join("tx_101_104.parquet")
        );
    }

    #[tokio::test]
    async fn incremental_up_to_date_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let context = ctx(dir.path());
        let source = MemorySource::chain(1, 20, 1);

        materialize(incremental(), &source, &context).await.unwrap();
        let requests = source.requests();

        let again = materialize(incremental(), &source, &context).await.unwrap();
        assert_eq!(again.blocks_scanned, 0);
        assert!(again.file.is_none(), "no file when up to date");
        assert_eq!(source.requests(), requests, "no blocks fetched");
    }

    #[tokio::test]
    async fn incremental_caps_blocks_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = ctx(dir.path());
        context.recent_blocks = 50;
        context.max_blocks_per_run = 20;
        let source = MemorySource::chain(1, 99, 1);

        let m = materialize(incremental(), &source, &context).await.unwrap();
        assert_eq!(m.first_block, Some(50));
        assert_eq!(m.blocks_scanned, 20);
        assert_eq!(
            Cursor::load(&incremental_dir(dir.path())).unwrap().unwrap().last_block,
            69
        );
    }

    #[tokio::test]
    async fn incremental_resumes_after_orphaned_output() {
        let dir = tempfile::tempdir().unwrap();
        let context = ctx(dir.path());
        let inc = incremental_dir(dir.path());

        Cursor::now(90).save(&inc).unwrap();
        // A previous run wrote its file but died before advancing the cursor.
        parquet::write_records(&inc.join("tx_91_95.parquet"), &[]).unwrap();

        let m = materialize(incremental(), &MemorySource::chain(1, 100, 1), &context)
            .await
            .unwrap();
        assert_eq!(m.first_block, Some(96));
        assert_eq!(m.blocks_scanned, 5);
    }

    #[tokio::test]
    async fn output_at_max_block_is_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let inc = incremental_dir(dir.path());
        parquet::write_records(&inc.join(format!("tx_0_{}.parquet", u64::MAX)), &[]).unwrap();

        let source = MemorySource::chain(1, 100, 1);
        let m = materialize(incremental(), &source, &ctx(dir.path())).await.unwrap();
        assert!(m.file.is_none(), "nothing past the last block");
        assert_eq!(m.blocks_scanned, 0);
        assert_eq!(source.requests(), 0, "genesis not refetched");
    }

    #[test]
    fn sidecar_save_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tx_1_2.parquet");
        let m = Materialization {
            asset: "ethereum_transactions".to_owned(),
            blocks_scanned: 2,
            first_block: Some(1),
            latest_block: 2,
            num_transactions: 0,
            preview: preview::NO_ROWS.to_owned(),
            file: Some(file.clone()),
            materialized_at: Utc::now(),
        };
        m.save().unwrap();

        let sidecar = Materialization::metadata_path(&file);
        assert_eq!(Materialization::load(&sidecar).unwrap(), m);
        assert!(
            !sidecar.with_extension("json.tmp").exists(),
            "temp file renamed away"
        );
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cursor_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let context = ctx(dir.path());
        let inc = incremental_dir(dir.path());
        Cursor::now(95).save(&inc).unwrap();

        let source = MemorySource::chain(1, 100, 1).failing_first(u32::MAX);
        let err = materialize(incremental(), &source, &context).await.unwrap_err();
        assert!(format!("{err:#}").contains("ethereum_transactions"), "got: {err:#}");
        assert_eq!(Cursor::load(&inc).unwrap().unwrap().last_block, 95);
    }
}
