//! Runtime configuration.
//!
//! Settings are resolved from, highest priority first:
//!
//! 1. command-line overrides,
//! 2. the process environment (after loading a local `.env` file, whose
//!    values never replace variables that are already set),
//! 3. an optional `ethpipe.toml`,
//! 4. built-in defaults.
//!
//! An RPC endpoint is mandatory: resolution fails fast when neither
//! `ETHEREUM_RPC_URL`, the config file, nor the command line provides one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ethpipe::Network;
use serde::Deserialize;

/// Primary RPC endpoint.
pub const ENV_RPC_URL: &str = "ETHEREUM_RPC_URL";
/// Number of most recent blocks scanned by the recent-transactions asset.
pub const ENV_RECENT_BLOCKS: &str = "ETH_TX_RECENT_BLOCKS";
/// Root directory for asset output.
pub const ENV_DATA_DIR: &str = "ETHPIPE_DATA_DIR";
/// Network the RPC endpoint is expected to serve.
pub const ENV_NETWORK: &str = "ETHPIPE_NETWORK";

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "ethpipe.toml";

const DEFAULT_RECENT_BLOCKS: u64 = 10;
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_BLOCKS_PER_RUN: u64 = 1_000;

/// Contents of `ethpipe.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Ordered RPC URLs (best first). Used after `ETHEREUM_RPC_URL`.
    #[serde(default)]
    pub rpcs: Vec<String>,
    /// Recent-block window.
    pub recent_blocks: Option<u64>,
    /// Output root.
    pub data_dir: Option<PathBuf>,
    /// Expected network name (`mainnet`, `sepolia`, ...).
    pub network: Option<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Upper bound on blocks fetched by one incremental run.
    pub max_blocks_per_run: Option<u64>,
}

impl FileConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns [`FileConfig::default`] if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Values supplied on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    /// Replaces every other RPC source when non-empty.
    pub rpcs: Vec<String>,
    /// Recent-block window.
    pub recent_blocks: Option<u64>,
    /// Output root.
    pub data_dir: Option<PathBuf>,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// RPC endpoints in fallback order; never empty.
    pub rpcs: Vec<String>,
    /// Number of most recent blocks to scan; at least 1.
    pub recent_blocks: u64,
    /// Output root.
    pub data_dir: PathBuf,
    /// Network the endpoints must serve.
    pub network: Network,
    /// Timeout applied to each RPC request.
    pub request_timeout: Duration,
    /// Upper bound on blocks fetched by one incremental run; at least 1.
    pub max_blocks_per_run: u64,
}

impl Settings {
    /// Resolve settings from the real environment and the config file at
    /// `config_path`.
    ///
    /// # Errors
    ///
    /// See [`Settings::resolve`]; also fails if the config file is invalid.
    pub fn load(config_path: &Path, overrides: Overrides) -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        let file = FileConfig::load(config_path)?;
        Self::resolve(file, overrides, |key| std::env::var(key).ok())
    }

    /// Merge the config sources. `env` looks up an environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if no RPC endpoint is configured, a numeric variable
    /// does not parse, a window is zero, or the network name is unknown.
    pub fn resolve<F>(file: FileConfig, overrides: Overrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let rpcs = if overrides.rpcs.is_empty() {
            let mut rpcs: Vec<String> = lookup(ENV_RPC_URL).into_iter().collect();
            for url in file.rpcs {
                if !rpcs.contains(&url) {
                    rpcs.push(url);
                }
            }
            rpcs
        } else {
            overrides.rpcs
        };
        if rpcs.is_empty() {
            bail!("{ENV_RPC_URL} is not set and no RPC endpoint is configured");
        }

        let recent_blocks = match overrides.recent_blocks {
            Some(n) => n,
            None => match lookup(ENV_RECENT_BLOCKS) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{ENV_RECENT_BLOCKS} is not an integer: {raw:?}"))?,
                None => file.recent_blocks.unwrap_or(DEFAULT_RECENT_BLOCKS),
            },
        };
        if recent_blocks == 0 {
            bail!("recent block window must be at least 1");
        }

        let data_dir = overrides
            .data_dir
            .or_else(|| lookup(ENV_DATA_DIR).map(PathBuf::from))
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let network = match lookup(ENV_NETWORK).or(file.network) {
            Some(name) => name.parse::<Network>()?,
            None => Network::EthereumMainnet,
        };

        let max_blocks_per_run = file
            .max_blocks_per_run
            .unwrap_or(DEFAULT_MAX_BLOCKS_PER_RUN);
        if max_blocks_per_run == 0 {
            bail!("max_blocks_per_run must be at least 1");
        }

        let request_timeout_secs = file
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }

        Ok(Self {
            rpcs,
            recent_blocks,
            data_dir,
            network,
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_blocks_per_run,
        })
    }
}
