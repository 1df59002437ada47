//! Wire-format coin representation.
//!
//! The custodial service speaks snake_case on the wire; domain objects are
//! camelCase. This module is the outbound half of that translation (the
//! inbound half is the serde aliases on [`Coin`] and friends), so no other
//! crate hand-builds wire field names.

use crate::coin::Coin;
use serde::{Deserialize, Serialize};

/// A coin as it appears in request bodies sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCoin {
    pub parent_coin_info: String,
    pub puzzle_hash: String,
    pub amount: String,
}

impl From<&Coin> for WireCoin {
    fn from(coin: &Coin) -> Self {
        Self {
            parent_coin_info: coin.parent_coin_info.clone(),
            puzzle_hash: coin.puzzle_hash.clone(),
            amount: coin.amount.clone(),
        }
    }
}

impl From<WireCoin> for Coin {
    fn from(wire: WireCoin) -> Self {
        Coin {
            parent_coin_info: wire.parent_coin_info,
            puzzle_hash: wire.puzzle_hash,
            amount: wire.amount,
        }
    }
}
