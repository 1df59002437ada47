//! Core types and constants for the Tidepool custodial Chia wallet.
//!
//! This crate provides the foundational types used across all Tidepool
//! crates: coin records and coin-ID hashing, driver (puzzle-type) metadata,
//! bech32m address encoding/decoding, and mojo/XCH unit conversion.
//! It performs no I/O.

pub mod address;
pub mod coin;
pub mod constants;
pub mod units;
pub mod wire;

pub use address::{address_to_puzzle_hash, decode_address, puzzle_hash_to_address, AddressError, DecodedAddress};
pub use coin::{
    is_valid_coin_id, normalize_coin, Coin, CoinCategory, CoinError, DriverInfo, HydratedCoin,
    NftMetadata, ParentSpendInfo, RoyaltyInfo,
};
pub use constants::{Network, CACHE_NAMESPACE_LEN, MOJOS_PER_XCH};
pub use units::{format_xch, mojos_to_xch, mojos_to_xch_u64, xch_to_mojos, UnitsError};
pub use wire::WireCoin;
