//! Network constants and size definitions.

use serde::{Deserialize, Serialize};

/// Mojos per XCH (1 XCH = 10^12 mojos).
pub const MOJOS_PER_XCH: u64 = 1_000_000_000_000;

/// Size of a puzzle hash / coin ID / parent coin info in bytes.
pub const PUZZLE_HASH_SIZE: usize = 32;

/// Length of a coin ID rendered as hex.
pub const COIN_ID_HEX_LEN: usize = 2 * PUZZLE_HASH_SIZE;

/// Bech32m human-readable prefix for NFT addresses (launcher IDs).
pub const NFT_ADDRESS_PREFIX: &str = "nft";

/// Number of leading address characters used to namespace cached metadata.
pub const CACHE_NAMESPACE_LEN: usize = 16;

/// Network type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// Bech32m human-readable prefix for wallet addresses on this network.
    pub fn address_prefix(&self) -> &'static str {
        match self {
            Network::Mainnet => "xch",
            Network::Testnet => "txch",
        }
    }
}
