//! NFT metadata cache.
//!
//! Metadata JSON fetched from NFT URIs is cached per wallet with a 24 hour
//! TTL. Keys are namespaced by the owning address so two wallets never
//! read each other's entries. Concurrent resolves of the same URI within
//! one cache coalesce into a single fetch.

use crate::error::WalletError;
use crate::state::now_ms;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tidepool_types::CACHE_NAMESPACE_LEN;
use tokio::sync::watch;

/// How long a cached entry stays fresh.
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One cached metadata document with its write timestamp (epoch ms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    pub timestamp: u64,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: u64, ttl: Duration) -> bool {
        now.saturating_sub(self.timestamp) < ttl.as_millis() as u64
    }
}

/// Keyed entry storage. Implementations only store and load; TTL policy
/// lives in [`MetadataCache`].
pub trait MetadataStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, WalletError>;
    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), WalletError>;
}

/// In-memory store. Entries live as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: StdMutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, WalletError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| WalletError::Storage("cache mutex poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), WalletError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| WalletError::Storage("cache mutex poisoned".to_string()))?;
        entries.insert(key.to_string(), entry);
        Ok(())
    }
}

/// File-backed store: the whole key map as one JSON document, rewritten
/// on every put. Metadata volumes per wallet are small enough that this
/// beats a directory of per-entry files.
pub struct FileStore {
    path: PathBuf,
    entries: StdMutex<HashMap<String, CacheEntry>>,
}

impl FileStore {
    /// Open the store at `path`, loading any existing map. A missing file
    /// starts empty; a corrupt one is discarded rather than wedging the
    /// cache.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WalletError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!("discarding corrupt metadata cache {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(WalletError::Storage(format!(
                    "read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        Ok(Self {
            path,
            entries: StdMutex::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, CacheEntry>) -> Result<(), WalletError> {
        let raw = serde_json::to_string(entries)
            .map_err(|e| WalletError::Storage(format!("serialize cache: {}", e)))?;
        std::fs::write(&self.path, raw)
            .map_err(|e| WalletError::Storage(format!("write {}: {}", self.path.display(), e)))
    }
}

impl MetadataStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, WalletError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| WalletError::Storage("cache mutex poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), WalletError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| WalletError::Storage("cache mutex poisoned".to_string()))?;
        entries.insert(key.to_string(), entry);
        self.persist(&entries)
    }
}

/// Fetches a metadata document from a URI.
pub trait MetadataFetcher: Send + Sync {
    fn fetch_json(&self, uri: &str) -> impl Future<Output = Result<Value, WalletError>> + Send;
}

/// HTTP(S) fetcher with a short timeout; metadata hosts are third-party
/// and must not stall wallet rendering.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataFetcher for HttpFetcher {
    fn fetch_json(&self, uri: &str) -> impl Future<Output = Result<Value, WalletError>> + Send {
        let request = if uri.starts_with("http://") || uri.starts_with("https://") {
            Ok(self.client.get(uri))
        } else {
            Err(WalletError::Fetch(format!(
                "unsupported metadata uri scheme: {}",
                uri
            )))
        };
        let uri = uri.to_string();
        async move {
            let response = request?
                .send()
                .await
                .map_err(|e| WalletError::Fetch(format!("{}: {}", uri, e)))?;
            if !response.status().is_success() {
                return Err(WalletError::Fetch(format!(
                    "{}: http status {}",
                    uri,
                    response.status().as_u16()
                )));
            }
            response
                .json()
                .await
                .map_err(|e| WalletError::Fetch(format!("{}: {}", uri, e)))
        }
    }
}

type FetchOutcome = Result<Value, WalletError>;
type InflightMap = StdMutex<HashMap<String, watch::Receiver<Option<FetchOutcome>>>>;

/// Removes an in-flight map entry when the owning fetch ends, completed
/// or cancelled. A cancelled leader must not leave a dead entry behind.
struct InflightGuard<'a> {
    map: &'a InflightMap,
    key: &'a str,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(self.key);
    }
}

enum Slot {
    Leader(watch::Sender<Option<FetchOutcome>>),
    Follower(watch::Receiver<Option<FetchOutcome>>),
}

/// Per-wallet metadata cache over a store and a fetcher.
pub struct MetadataCache<S: MetadataStore, F: MetadataFetcher> {
    store: S,
    fetcher: F,
    namespace: String,
    ttl: Duration,
    // Held only for map lookups, never across an await.
    inflight: InflightMap,
}

impl<S: MetadataStore, F: MetadataFetcher> MetadataCache<S, F> {
    /// A cache scoped to one wallet address.
    pub fn new(address: &str, store: S, fetcher: F) -> Self {
        Self::with_ttl(address, store, fetcher, CACHE_TTL)
    }

    pub fn with_ttl(address: &str, store: S, fetcher: F, ttl: Duration) -> Self {
        // The address prefix is enough to keep wallets apart without
        // dragging full bech32 strings into every key.
        let namespace = address
            .chars()
            .take(CACHE_NAMESPACE_LEN)
            .collect::<String>();
        Self {
            store,
            fetcher,
            namespace,
            ttl,
            inflight: StdMutex::new(HashMap::new()),
        }
    }

    fn key(&self, uri: &str) -> String {
        format!("{}:{}", self.namespace, uri)
    }

    /// Look the URI up in the store only. Returns `None` when absent or
    /// older than the TTL; never fetches.
    pub fn get(&self, uri: &str) -> Result<Option<Value>, WalletError> {
        match self.store.get(&self.key(uri))? {
            Some(entry) if entry.is_fresh(now_ms(), self.ttl) => Ok(Some(entry.data)),
            _ => Ok(None),
        }
    }

    /// Resolve the URI: a fresh cached entry wins, otherwise fetch and
    /// cache. Concurrent resolves of one URI share a single fetch; if the
    /// leading caller is cancelled mid-fetch, its in-flight entry is
    /// removed and the next caller fetches anew. A failed fetch leaves
    /// any previous (stale) entry in place.
    pub async fn resolve(&self, uri: &str) -> FetchOutcome {
        loop {
            if let Some(data) = self.get(uri)? {
                return Ok(data);
            }

            let key = self.key(uri);
            let slot = {
                let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
                match inflight.get(&key).cloned() {
                    Some(rx) => Slot::Follower(rx),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        inflight.insert(key.clone(), rx);
                        Slot::Leader(tx)
                    }
                }
            };

            match slot {
                Slot::Leader(tx) => {
                    let guard = InflightGuard {
                        map: &self.inflight,
                        key: &key,
                    };
                    let outcome = self.fetch_and_store(uri, &key).await;
                    drop(guard);
                    let _ = tx.send(Some(outcome.clone()));
                    return outcome;
                }
                Slot::Follower(mut rx) => {
                    log::debug!("metadata fetch already in flight: {}", uri);
                    match rx.wait_for(|v| v.is_some()).await {
                        Ok(value) => {
                            if let Some(outcome) = &*value {
                                return outcome.clone();
                            }
                        }
                        // The leader was cancelled; its entry is gone, so
                        // the next pass fetches anew.
                        Err(_) => continue,
                    }
                }
            }
        }
    }

    async fn fetch_and_store(&self, uri: &str, key: &str) -> FetchOutcome {
        let data = self.fetcher.fetch_json(uri).await?;
        self.store.put(
            key,
            CacheEntry {
                data: data.clone(),
                timestamp: now_ms(),
            },
        )?;
        log::debug!("cached metadata for {}", uri);
        Ok(data)
    }
}
