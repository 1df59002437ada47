//! Coin records, coin-ID hashing, and driver (puzzle-type) metadata.
//!
//! A coin ID is `SHA256(parent_coin_info ∥ puzzle_hash ∥ amount)` where the
//! amount is encoded as its minimal big-endian representation: empty for
//! zero, with a leading zero byte only when the top bit of the first byte
//! would otherwise read as a sign bit. This matches the canonical on-chain
//! scheme, so IDs computed here agree with server-side values. They are
//! advisory (display and pre-validation), not a security boundary.

use crate::constants::{COIN_ID_HEX_LEN, PUZZLE_HASH_SIZE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoinError {
    #[error("coin input must be a JSON object")]
    NotAnObject,

    #[error("missing required coin field: {0}")]
    MissingField(&'static str),

    #[error("coin field {field} is not valid hex: {detail}")]
    InvalidHex { field: &'static str, detail: String },

    #[error("coin field {field} must decode to {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid coin amount: {0}")]
    InvalidAmount(String),
}

/// A Chia coin: parent coin info, puzzle hash, and amount in mojos.
///
/// Hex fields are kept as strings (an optional `0x` prefix is tolerated and
/// preserved); the amount is a decimal string so values above 2^53 survive
/// JSON round-trips. Serializes in camelCase domain form; deserializes from
/// either camelCase or snake_case wire spellings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coin {
    #[serde(alias = "parent_coin_info")]
    pub parent_coin_info: String,
    #[serde(alias = "puzzle_hash")]
    pub puzzle_hash: String,
    pub amount: String,
}

impl Coin {
    pub fn new(
        parent_coin_info: impl Into<String>,
        puzzle_hash: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            parent_coin_info: parent_coin_info.into(),
            puzzle_hash: puzzle_hash.into(),
            amount: amount.into(),
        }
    }

    /// Amount in mojos as an integer.
    pub fn amount_mojos(&self) -> Result<u128, CoinError> {
        parse_amount(&self.amount)
    }

    /// The 32-byte parent coin info.
    pub fn parent_bytes(&self) -> Result<[u8; 32], CoinError> {
        decode_hash("parentCoinInfo", &self.parent_coin_info)
    }

    /// The 32-byte puzzle hash.
    pub fn puzzle_hash_bytes(&self) -> Result<[u8; 32], CoinError> {
        decode_hash("puzzleHash", &self.puzzle_hash)
    }

    /// Content-addressed coin ID:
    /// `SHA256(parent ∥ puzzle_hash ∥ minimal_be(amount))`.
    pub fn coin_id_bytes(&self) -> Result<[u8; 32], CoinError> {
        let mut hasher = Sha256::new();
        hasher.update(self.parent_bytes()?);
        hasher.update(self.puzzle_hash_bytes()?);
        hasher.update(amount_to_minimal_be(self.amount_mojos()?));
        Ok(hasher.finalize().into())
    }

    /// Coin ID as 64 lowercase hex characters.
    pub fn coin_id(&self) -> Result<String, CoinError> {
        Ok(hex::encode(self.coin_id_bytes()?))
    }
}

/// Normalize a loosely-shaped coin value (snake_case wire or camelCase
/// domain) into a [`Coin`].
///
/// Fails closed: a missing field, a non-object input, or an amount that is
/// not a non-negative integer all produce a [`CoinError`] rather than
/// defaulting the field. Hex payloads pass through untouched.
pub fn normalize_coin(input: &Value) -> Result<Coin, CoinError> {
    let obj = input.as_object().ok_or(CoinError::NotAnObject)?;

    let parent = string_field(obj, "parentCoinInfo", "parent_coin_info")?;
    let puzzle_hash = string_field(obj, "puzzleHash", "puzzle_hash")?;

    let amount_raw = obj
        .get("amount")
        .ok_or(CoinError::MissingField("amount"))?;
    let amount = match amount_raw {
        Value::String(s) => {
            parse_amount(s)?;
            s.trim().to_string()
        }
        Value::Number(n) => n
            .as_u64()
            .map(|v| v.to_string())
            .ok_or_else(|| CoinError::InvalidAmount(n.to_string()))?,
        other => return Err(CoinError::InvalidAmount(other.to_string())),
    };

    Ok(Coin {
        parent_coin_info: parent,
        puzzle_hash,
        amount,
    })
}

fn string_field(
    obj: &serde_json::Map<String, Value>,
    camel: &'static str,
    snake: &'static str,
) -> Result<String, CoinError> {
    obj.get(camel)
        .or_else(|| obj.get(snake))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or(CoinError::MissingField(camel))
}

/// A coin ID string is well-formed iff it is exactly 64 hex characters
/// (case-insensitive). Format validation only, not a correctness proof.
pub fn is_valid_coin_id(s: &str) -> bool {
    s.len() == COIN_ID_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse a decimal mojo amount. Rejects empty, negative, fractional, or
/// non-decimal input.
fn parse_amount(s: &str) -> Result<u128, CoinError> {
    let trimmed = s.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoinError::InvalidAmount(s.to_string()));
    }
    trimmed
        .parse::<u128>()
        .map_err(|_| CoinError::InvalidAmount(s.to_string()))
}

/// Minimal big-endian encoding of a non-negative amount: empty for zero,
/// leading zero byte only when the high bit of the first byte is set.
fn amount_to_minimal_be(amount: u128) -> Vec<u8> {
    if amount == 0 {
        return Vec::new();
    }
    let be = amount.to_be_bytes();
    let start = be.iter().position(|&b| b != 0).unwrap_or(be.len() - 1);
    let mut bytes = be[start..].to_vec();
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    bytes
}

fn decode_hash(field: &'static str, s: &str) -> Result<[u8; 32], CoinError> {
    let stripped = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|e| CoinError::InvalidHex {
        field,
        detail: e.to_string(),
    })?;
    if bytes.len() != PUZZLE_HASH_SIZE {
        return Err(CoinError::InvalidLength {
            field,
            expected: PUZZLE_HASH_SIZE,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

// =============================================================================
// Driver metadata
// =============================================================================

/// Puzzle-type driver metadata attached to a hydrated coin's parent spend.
///
/// Absent driver info means a standard XCH coin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DriverInfo {
    #[serde(rename = "CAT", rename_all = "camelCase")]
    Cat {
        #[serde(alias = "asset_id")]
        asset_id: String,
    },
    #[serde(rename = "NFT", rename_all = "camelCase")]
    Nft {
        #[serde(alias = "launcher_id")]
        launcher_id: String,
        #[serde(default)]
        metadata: NftMetadata,
        #[serde(default)]
        royalty: Option<RoyaltyInfo>,
        #[serde(default, alias = "current_owner")]
        current_owner: Option<String>,
    },
    #[serde(rename = "DID", rename_all = "camelCase")]
    Did {
        #[serde(default, alias = "launcher_id")]
        launcher_id: Option<String>,
    },
}

/// On-chain NFT metadata pointers (the documents live off-chain).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftMetadata {
    #[serde(default, alias = "data_uris")]
    pub data_uris: Vec<String>,
    #[serde(default, alias = "metadata_uris")]
    pub metadata_uris: Vec<String>,
    #[serde(default, alias = "license_uris")]
    pub license_uris: Vec<String>,
    #[serde(default, alias = "edition_number")]
    pub edition_number: Option<u64>,
    #[serde(default, alias = "edition_total")]
    pub edition_total: Option<u64>,
}

impl NftMetadata {
    /// First metadata URI, the one resolved for display.
    pub fn primary_metadata_uri(&self) -> Option<&str> {
        self.metadata_uris.first().map(|s| s.as_str())
    }
}

/// NFT royalty terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoyaltyInfo {
    #[serde(alias = "royalty_address")]
    pub royalty_address: String,
    /// Royalty in basis points (1/100th of a percent).
    #[serde(alias = "royalty_basis_points")]
    pub royalty_basis_points: u16,
}

/// Wallet-facing coin classification derived from driver info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoinCategory {
    Xch,
    Cat,
    Nft,
    Did,
}

/// Parent-spend annotation attached by the hydrated-coins endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentSpendInfo {
    pub coin: Coin,
    #[serde(default, alias = "driver_info")]
    pub driver_info: Option<DriverInfo>,
    #[serde(alias = "parent_coin_id")]
    pub parent_coin_id: String,
    #[serde(default, alias = "spent_block_index")]
    pub spent_block_index: u64,
}

/// An unspent coin annotated with creation height and parent-spend driver
/// info. Immutable snapshot; each refresh replaces the prior set wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedCoin {
    pub coin: Coin,
    #[serde(alias = "created_height")]
    pub created_height: u64,
    #[serde(alias = "parent_spend_info")]
    pub parent_spend_info: ParentSpendInfo,
}

impl HydratedCoin {
    /// Classify this coin by its parent spend's driver info.
    pub fn category(&self) -> CoinCategory {
        match self.parent_spend_info.driver_info {
            None => CoinCategory::Xch,
            Some(DriverInfo::Cat { .. }) => CoinCategory::Cat,
            Some(DriverInfo::Nft { .. }) => CoinCategory::Nft,
            Some(DriverInfo::Did { .. }) => CoinCategory::Did,
        }
    }
}
