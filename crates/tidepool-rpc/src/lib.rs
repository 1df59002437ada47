//! Tidepool API client library.
//!
//! Async HTTP client for the remote custodial signing/broadcast service:
//! health and key queries, unspent/hydrated coin fetches, spend-bundle
//! signing and broadcast, NFT offers, and mixed-asset transfers. Every
//! fallible call returns a `Result` — no panics cross the API boundary.
//!
//! # Example
//!
//! ```ignore
//! use tidepool_rpc::CustodyClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = CustodyClient::new("https://custody.example.com");
//!     client.set_token(Some("jwt".to_string()));
//!     let keys = client.wallet_keys().await.unwrap();
//!     println!("Address: {}", keys.address);
//! }
//! ```

pub mod client;
pub mod custody;
pub mod error;

pub use client::{ApiConfig, HttpClient};
pub use custody::{
    BroadcastResult, CatTransfer, CoinSpend, CustodyClient, HealthStatus, NftOfferData,
    NftTransfer, Payment, SpendBundle, TransferRequest, WalletKeys, XchTransfer,
};
pub use error::RpcError;
