//! Wallet state snapshots.
//!
//! A `WalletState` is built once per refresh from the full hydrated coin
//! set and published behind an `Arc`; it is never mutated in place, so
//! readers always see a consistent snapshot.

use crate::error::WalletError;
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tidepool_types::{CoinCategory, HydratedCoin};

/// Aggregated wallet view for one refresh.
///
/// Every fetched coin lands in exactly one of the four categorized lists;
/// `total_balance_mojos` sums the XCH list only (CAT/NFT/DID amounts are
/// tracked by their own lists, never mixed into the XCH total).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    pub address: String,
    pub total_balance_mojos: u128,
    pub coin_count: usize,
    pub xch_coins: Vec<HydratedCoin>,
    pub cat_coins: Vec<HydratedCoin>,
    pub nft_coins: Vec<HydratedCoin>,
    pub did_coins: Vec<HydratedCoin>,
    /// Epoch milliseconds of the refresh that produced this snapshot.
    pub refreshed_at_ms: u64,
}

impl WalletState {
    /// Partition a fetched coin set into categorized lists and compute the
    /// XCH balance.
    pub fn categorize(
        address: &str,
        coins: Vec<HydratedCoin>,
    ) -> Result<WalletState, WalletError> {
        let coin_count = coins.len();
        let mut xch_coins = Vec::new();
        let mut cat_coins = Vec::new();
        let mut nft_coins = Vec::new();
        let mut did_coins = Vec::new();
        let mut total_balance_mojos: u128 = 0;

        for coin in coins {
            match coin.category() {
                CoinCategory::Xch => {
                    total_balance_mojos += coin
                        .coin
                        .amount_mojos()
                        .map_err(|e| WalletError::InvalidAmount(e.to_string()))?;
                    xch_coins.push(coin);
                }
                CoinCategory::Cat => cat_coins.push(coin),
                CoinCategory::Nft => nft_coins.push(coin),
                CoinCategory::Did => did_coins.push(coin),
            }
        }

        Ok(WalletState {
            address: address.to_string(),
            total_balance_mojos,
            coin_count,
            xch_coins,
            cat_coins,
            nft_coins,
            did_coins,
            refreshed_at_ms: now_ms(),
        })
    }

    /// Whether this snapshot is older than the given threshold.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        now_ms().saturating_sub(self.refreshed_at_ms) > threshold.as_millis() as u64
    }
}

/// Current time as epoch milliseconds.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
