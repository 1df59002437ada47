//! Bech32m address encoding and decoding.
//!
//! A Chia address is the bech32m encoding of a 32-byte puzzle hash under a
//! human-readable prefix: `xch` (mainnet), `txch` (testnet), or `nft`
//! (launcher IDs). Decoding here is the sole gate against malformed
//! recipient input before a transfer request is sent.

use crate::constants::PUZZLE_HASH_SIZE;
use bech32::{FromBase32, ToBase32, Variant};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AddressError {
    #[error("address must be a non-empty string")]
    Empty,

    #[error("bech32 decode error: {0}")]
    Decode(String),

    #[error("address is not bech32m encoded")]
    WrongVariant,

    #[error("wrong address prefix: expected {expected:?}, got {actual:?}")]
    WrongPrefix { expected: String, actual: String },

    #[error("address payload must be {expected} bytes, got {actual}")]
    InvalidDataLength { expected: usize, actual: usize },

    #[error("puzzle hash is not valid hex: {0}")]
    InvalidHex(String),

    #[error("bech32 encode error: {0}")]
    Encode(String),
}

/// Result of decoding an address.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAddress {
    pub prefix: String,
    pub puzzle_hash: [u8; PUZZLE_HASH_SIZE],
}

impl DecodedAddress {
    /// Puzzle hash as 64 lowercase hex characters.
    pub fn puzzle_hash_hex(&self) -> String {
        hex::encode(self.puzzle_hash)
    }
}

/// Decode and validate a bech32m address, returning its prefix and the
/// 32-byte puzzle hash it encodes.
pub fn decode_address(address: &str) -> Result<DecodedAddress, AddressError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AddressError::Empty);
    }

    let (prefix, data, variant) =
        bech32::decode(address).map_err(|e| AddressError::Decode(e.to_string()))?;
    if variant != Variant::Bech32m {
        return Err(AddressError::WrongVariant);
    }

    let bytes =
        Vec::<u8>::from_base32(&data).map_err(|e| AddressError::Decode(e.to_string()))?;
    if bytes.len() != PUZZLE_HASH_SIZE {
        return Err(AddressError::InvalidDataLength {
            expected: PUZZLE_HASH_SIZE,
            actual: bytes.len(),
        });
    }

    let mut puzzle_hash = [0u8; PUZZLE_HASH_SIZE];
    puzzle_hash.copy_from_slice(&bytes);
    Ok(DecodedAddress {
        prefix,
        puzzle_hash,
    })
}

/// Decode an address and require a specific prefix, returning the puzzle
/// hash as hex.
pub fn address_to_puzzle_hash(
    address: &str,
    expected_prefix: &str,
) -> Result<String, AddressError> {
    let decoded = decode_address(address)?;
    if decoded.prefix != expected_prefix {
        return Err(AddressError::WrongPrefix {
            expected: expected_prefix.to_string(),
            actual: decoded.prefix,
        });
    }
    Ok(decoded.puzzle_hash_hex())
}

/// Encode a 32-byte puzzle hash (hex, optional `0x` prefix) as a bech32m
/// address under the given prefix.
pub fn puzzle_hash_to_address(
    puzzle_hash_hex: &str,
    prefix: &str,
) -> Result<String, AddressError> {
    let stripped = puzzle_hash_hex
        .strip_prefix("0x")
        .or_else(|| puzzle_hash_hex.strip_prefix("0X"))
        .unwrap_or(puzzle_hash_hex);
    let bytes = hex::decode(stripped).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
    if bytes.len() != PUZZLE_HASH_SIZE {
        return Err(AddressError::InvalidDataLength {
            expected: PUZZLE_HASH_SIZE,
            actual: bytes.len(),
        });
    }

    bech32::encode(prefix, bytes.to_base32(), Variant::Bech32m)
        .map_err(|e| AddressError::Encode(e.to_string()))
}
