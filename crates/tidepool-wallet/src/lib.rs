//! Tidepool wallet synchronization library.
//!
//! Client-side data layer for a custodial Chia wallet: the [`SyncEngine`]
//! turns API responses into immutable [`WalletState`] snapshots with
//! per-category coin sets and an XCH balance, and the [`MetadataCache`]
//! resolves NFT metadata URIs with per-wallet namespacing and a 24 hour
//! TTL. All signing and broadcast stays on the remote service; this crate
//! never touches key material.

pub mod cache;
pub mod error;
pub mod state;
pub mod sync;

pub use cache::{
    CacheEntry, FileStore, HttpFetcher, MemoryStore, MetadataCache, MetadataFetcher,
    MetadataStore, CACHE_TTL,
};
pub use error::WalletError;
pub use state::WalletState;
pub use sync::{ConnectionState, SyncConfig, SyncEngine, WalletBackend, WalletSnapshot};
