//! Known Ethereum networks the pipeline can ingest from.
//!
//! The pipeline talks to whatever RPC endpoint it is given; the network is
//! only used to check that the endpoint actually serves the expected chain.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Ethereum networks with a stable chain ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Network {
    /// Ethereum Mainnet (chain ID 1).
    EthereumMainnet,
    /// Ethereum Sepolia testnet (chain ID 11155111).
    EthereumSepolia,
    /// Ethereum Holesky testnet (chain ID 17000).
    EthereumHolesky,
    /// Ethereum Hoodi testnet (chain ID 560048).
    EthereumHoodi,
}

impl Network {
    /// All known network variants.
    pub const ALL: &[Self] = &[
        Self::EthereumMainnet,
        Self::EthereumSepolia,
        Self::EthereumHolesky,
        Self::EthereumHoodi,
    ];

    /// Returns the EIP-155 chain ID for this network.
    #[must_use]
    pub const fn chain_id(self) -> u64 {
        match self {
            Self::EthereumMainnet => 1,
            Self::EthereumSepolia => 11_155_111,
            Self::EthereumHolesky => 17_000,
            Self::EthereumHoodi => 560_048,
        }
    }

    /// Stable lowercase slug used in config files and on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::EthereumMainnet => "mainnet",
            Self::EthereumSepolia => "sepolia",
            Self::EthereumHolesky => "holesky",
            Self::EthereumHoodi => "hoodi",
        }
    }

    /// Whether this is a testnet.
    #[must_use]
    pub const fn is_testnet(self) -> bool {
        !matches!(self, Self::EthereumMainnet)
    }

    /// Suggested public RPC endpoint, for documentation and examples only.
    #[must_use]
    pub const fn public_rpc(self) -> &'static str {
        match self {
            Self::EthereumMainnet => "https://ethereum-rpc.publicnode.com",
            Self::EthereumSepolia => "https://ethereum-sepolia-rpc.publicnode.com",
            Self::EthereumHolesky => "https://ethereum-holesky-rpc.publicnode.com",
            Self::EthereumHoodi => "https://ethereum-hoodi-rpc.publicnode.com",
        }
    }

    /// Look up a [`Network`] by its EIP-155 chain ID.
    #[must_use]
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.iter().find(|n| n.chain_id() == chain_id).copied()
    }

    /// Look up a [`Network`] by name.
    ///
    /// Accepts the short slug (`"sepolia"`) as well as the
    /// `ethereum-` prefixed form (`"ethereum-sepolia"`), case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let slug = name.strip_prefix("ethereum-").unwrap_or(&name);
        Self::ALL.iter().find(|n| n.name() == slug).copied()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| Error::UnknownNetwork(s.to_owned()))
    }
}
