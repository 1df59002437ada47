//! Wallet error types.
//!
//! Variants carry string context (not error sources) so results can be
//! cloned and fanned out to every caller awaiting a shared refresh.

use thiserror::Error;
use tidepool_rpc::RpcError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum WalletError {
    #[error("a non-empty JWT token is required to connect")]
    InvalidToken,

    #[error("wallet is not connected")]
    NotConnected,

    #[error("API error: {0}")]
    Rpc(String),

    #[error("sync error: {0}")]
    Sync(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("metadata fetch failed: {0}")]
    Fetch(String),

    #[error("invalid coin amount: {0}")]
    InvalidAmount(String),

    #[error("{0}")]
    Other(String),
}

impl From<RpcError> for WalletError {
    fn from(e: RpcError) -> Self {
        WalletError::Rpc(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_context_preserved() {
        let rpc = RpcError::Validation("address is empty".to_string());
        let wallet: WalletError = rpc.into();
        assert!(wallet.to_string().contains("address is empty"));
        let _cloned = wallet.clone();
    }
}
