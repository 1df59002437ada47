//! Wallet synchronization engine.
//!
//! Orchestrates API calls into a consistent [`WalletState`] snapshot:
//! connect fetches the signing identity and the initial coin set, refresh
//! replaces the snapshot wholesale, and at most one refresh is in flight
//! per engine — concurrent callers share the in-progress outcome instead
//! of issuing duplicate network calls.
//!
//! One engine instance per wallet identity; construct it with its backend
//! and tear it down with [`SyncEngine::disconnect`]. No process-wide
//! singletons.

use crate::error::WalletError;
use crate::state::WalletState;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tidepool_rpc::{CustodyClient, RpcError, WalletKeys};
use tidepool_types::HydratedCoin;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Connection lifecycle of one wallet identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Refreshing,
    ConnectionError,
}

/// The engine's view of the custodial API. A seam rather than a concrete
/// client so the dedup guarantee is testable without a server.
pub trait WalletBackend: Send + Sync {
    /// Install or clear the bearer token used for subsequent calls.
    fn set_token(&self, token: Option<String>);

    /// Fetch the signing identity bound to the token.
    fn fetch_keys(&self) -> impl Future<Output = Result<WalletKeys, RpcError>> + Send;

    /// Fetch the full hydrated coin set for an address.
    fn fetch_hydrated_coins(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Vec<HydratedCoin>, RpcError>> + Send;
}

impl WalletBackend for CustodyClient {
    fn set_token(&self, token: Option<String>) {
        CustodyClient::set_token(self, token);
    }

    fn fetch_keys(&self) -> impl Future<Output = Result<WalletKeys, RpcError>> + Send {
        self.wallet_keys()
    }

    fn fetch_hydrated_coins(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Vec<HydratedCoin>, RpcError>> + Send {
        self.hydrated_coins(address)
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Auto-refresh interval. `None` (default) means refresh only on demand.
    pub refresh_interval: Option<Duration>,
    /// Age beyond which `is_stale()` reports the snapshot as stale.
    pub stale_threshold: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval: None,
            stale_threshold: Duration::from_secs(60),
        }
    }
}

type RefreshOutcome = Result<Arc<WalletState>, WalletError>;

#[derive(Default)]
struct Inner {
    status: ConnectionState,
    keys: Option<WalletKeys>,
    state: Option<Arc<WalletState>>,
    last_error: Option<WalletError>,
    inflight: Option<watch::Receiver<Option<RefreshOutcome>>>,
    auto_refresh: Option<JoinHandle<()>>,
}

/// Combined caller-facing view: connection status, last published
/// snapshot, and last error.
#[derive(Debug, Clone)]
pub struct WalletSnapshot {
    pub status: ConnectionState,
    pub state: Option<Arc<WalletState>>,
    pub last_error: Option<WalletError>,
}

impl WalletSnapshot {
    pub fn is_connected(&self) -> bool {
        matches!(
            self.status,
            ConnectionState::Connected | ConnectionState::Refreshing
        )
    }

    pub fn is_refreshing(&self) -> bool {
        self.status == ConnectionState::Refreshing
    }
}

/// Wallet synchronization engine. One instance per wallet identity.
pub struct SyncEngine<B: WalletBackend> {
    backend: B,
    config: SyncConfig,
    inner: Mutex<Inner>,
}

impl<B: WalletBackend + 'static> SyncEngine<B> {
    pub fn new(backend: B) -> Arc<Self> {
        Self::with_config(backend, SyncConfig::default())
    }

    pub fn with_config(backend: B, config: SyncConfig) -> Arc<Self> {
        Arc::new(Self {
            backend,
            config,
            inner: Mutex::new(Inner::default()),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Connect with a session token: install it, fetch the signing
    /// identity, and perform the initial coin fetch.
    ///
    /// An empty token fails with [`WalletError::InvalidToken`] before any
    /// state change. On a fetch failure all wallet-derived fields are
    /// cleared, the error is retained, and the engine lands in
    /// `ConnectionError`.
    pub async fn connect(self: &Arc<Self>, token: &str) -> RefreshOutcome {
        let token = token.trim();
        if token.is_empty() {
            return Err(WalletError::InvalidToken);
        }

        {
            let mut inner = self.inner.lock().await;
            // Reconnecting tears the previous session down first.
            if let Some(handle) = inner.auto_refresh.take() {
                handle.abort();
            }
            *inner = Inner::default();
            inner.status = ConnectionState::Connecting;
        }
        self.backend.set_token(Some(token.to_string()));

        let keys = match self.backend.fetch_keys().await {
            Ok(keys) => keys,
            Err(e) => return Err(self.fail_connect(e.into()).await),
        };
        let coins = match self.backend.fetch_hydrated_coins(&keys.address).await {
            Ok(coins) => coins,
            Err(e) => return Err(self.fail_connect(e.into()).await),
        };
        let state = match WalletState::categorize(&keys.address, coins) {
            Ok(state) => Arc::new(state),
            Err(e) => return Err(self.fail_connect(e).await),
        };

        let mut inner = self.inner.lock().await;
        inner.status = ConnectionState::Connected;
        inner.keys = Some(keys);
        inner.state = Some(state.clone());
        inner.last_error = None;
        if let Some(interval) = self.config.refresh_interval {
            inner.auto_refresh = Some(self.spawn_auto_refresh(interval));
        }
        drop(inner);

        log::info!(
            "wallet connected: {} ({} coins)",
            state.address,
            state.coin_count
        );
        Ok(state)
    }

    async fn fail_connect(&self, error: WalletError) -> WalletError {
        log::warn!("connect failed: {}", error);
        self.backend.set_token(None);
        let mut inner = self.inner.lock().await;
        *inner = Inner::default();
        inner.status = ConnectionState::ConnectionError;
        inner.last_error = Some(error.clone());
        error
    }

    /// Refresh the wallet snapshot.
    ///
    /// Legal only while connected. If a refresh is already in flight, this
    /// call awaits that refresh's outcome instead of fetching again; the
    /// leader's completed snapshot replaces the previous one wholesale.
    /// The fetch itself runs in a detached task, so a caller that is
    /// cancelled (timeout, `select!`) cannot strand the in-flight marker;
    /// the refresh still completes and publishes. A failed refresh moves
    /// the engine to `ConnectionError` (the stale snapshot stays
    /// readable); the engine never retries on its own.
    pub async fn refresh(self: &Arc<Self>) -> RefreshOutcome {
        let mut rx = {
            let mut inner = self.inner.lock().await;
            if let Some(rx) = &inner.inflight {
                log::debug!("refresh already in flight, awaiting shared outcome");
                rx.clone()
            } else {
                if inner.status != ConnectionState::Connected {
                    return Err(WalletError::NotConnected);
                }
                let address = match &inner.keys {
                    Some(keys) => keys.address.clone(),
                    None => return Err(WalletError::NotConnected),
                };
                let (tx, rx) = watch::channel(None);
                inner.inflight = Some(rx.clone());
                inner.status = ConnectionState::Refreshing;

                let engine = self.clone();
                tokio::spawn(async move {
                    let outcome = engine.do_refresh(&address).await;
                    {
                        let mut inner = engine.inner.lock().await;
                        inner.inflight = None;
                        // A disconnect that raced the fetch wins; don't
                        // resurrect state it cleared.
                        if inner.status == ConnectionState::Refreshing {
                            match &outcome {
                                Ok(state) => {
                                    inner.state = Some(state.clone());
                                    inner.status = ConnectionState::Connected;
                                    inner.last_error = None;
                                }
                                Err(e) => {
                                    inner.status = ConnectionState::ConnectionError;
                                    inner.last_error = Some(e.clone());
                                }
                            }
                        }
                    }
                    let _ = tx.send(Some(outcome));
                });
                rx
            }
        };

        let value = rx
            .wait_for(|v| v.is_some())
            .await
            .map_err(|_| WalletError::Sync("in-flight refresh was dropped".to_string()))?;
        match &*value {
            Some(outcome) => outcome.clone(),
            None => Err(WalletError::Sync(
                "in-flight refresh produced no outcome".to_string(),
            )),
        }
    }

    async fn do_refresh(&self, address: &str) -> RefreshOutcome {
        let coins = self
            .backend
            .fetch_hydrated_coins(address)
            .await
            .map_err(WalletError::from)?;
        let state = WalletState::categorize(address, coins)?;
        log::debug!(
            "refresh complete: {} coins, balance {} mojos",
            state.coin_count,
            state.total_balance_mojos
        );
        Ok(Arc::new(state))
    }

    /// Tear the session down: cancel auto-refresh, clear the token and all
    /// wallet-derived fields. Idempotent.
    pub async fn disconnect(&self) {
        let handle = {
            let mut inner = self.inner.lock().await;
            let handle = inner.auto_refresh.take();
            *inner = Inner::default();
            handle
        };
        if let Some(handle) = handle {
            handle.abort();
        }
        self.backend.set_token(None);
        log::debug!("wallet disconnected");
    }

    pub async fn status(&self) -> ConnectionState {
        self.inner.lock().await.status
    }

    /// Last published snapshot, if any.
    pub async fn wallet_state(&self) -> Option<Arc<WalletState>> {
        self.inner.lock().await.state.clone()
    }

    pub async fn last_error(&self) -> Option<WalletError> {
        self.inner.lock().await.last_error.clone()
    }

    pub async fn snapshot(&self) -> WalletSnapshot {
        let inner = self.inner.lock().await;
        WalletSnapshot {
            status: inner.status,
            state: inner.state.clone(),
            last_error: inner.last_error.clone(),
        }
    }

    /// Whether the last snapshot is older than the configured staleness
    /// threshold (true when no snapshot exists).
    pub async fn is_stale(&self) -> bool {
        match self.wallet_state().await {
            Some(state) => state.is_stale(self.config.stale_threshold),
            None => true,
        }
    }

    fn spawn_auto_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; connect just fetched.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                if let Err(e) = engine.refresh().await {
                    log::warn!("auto-refresh failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tidepool_types::{Coin, DriverInfo, ParentSpendInfo};

    const XCH_ADDR: &str =
        "xch1424242424242424242424242424242424242424242424242424q48w9sf";

    fn hydrated(amount: &str, driver: Option<DriverInfo>) -> HydratedCoin {
        let coin = Coin::new("aa".repeat(32), "bb".repeat(32), amount);
        HydratedCoin {
            coin: coin.clone(),
            created_height: 100,
            parent_spend_info: ParentSpendInfo {
                coin,
                driver_info: driver,
                parent_coin_id: "cc".repeat(32),
                spent_block_index: 99,
            },
        }
    }

    struct MockBackend {
        keys: WalletKeys,
        coins: StdMutex<Vec<HydratedCoin>>,
        coin_calls: AtomicUsize,
        coin_delay: Duration,
        fail_keys: AtomicBool,
        fail_coins: AtomicBool,
        token: StdMutex<Option<String>>,
    }

    impl MockBackend {
        fn new(coins: Vec<HydratedCoin>) -> Self {
            Self {
                keys: WalletKeys {
                    address: XCH_ADDR.to_string(),
                    master_public_key: "8f".repeat(48),
                    puzzle_hash: "aa".repeat(32),
                    synthetic_public_key: "8e".repeat(48),
                },
                coins: StdMutex::new(coins),
                coin_calls: AtomicUsize::new(0),
                coin_delay: Duration::ZERO,
                fail_keys: AtomicBool::new(false),
                fail_coins: AtomicBool::new(false),
                token: StdMutex::new(None),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.coin_delay = delay;
            self
        }

        fn set_coins(&self, coins: Vec<HydratedCoin>) {
            *self.coins.lock().unwrap() = coins;
        }

        fn token(&self) -> Option<String> {
            self.token.lock().unwrap().clone()
        }
    }

    impl WalletBackend for Arc<MockBackend> {
        fn set_token(&self, token: Option<String>) {
            *self.token.lock().unwrap() = token;
        }

        fn fetch_keys(&self) -> impl Future<Output = Result<WalletKeys, RpcError>> + Send {
            let fail = self.fail_keys.load(Ordering::SeqCst);
            let keys = self.keys.clone();
            async move {
                if fail {
                    Err(RpcError::AuthFailed {
                        endpoint: "/keys".to_string(),
                    })
                } else {
                    Ok(keys)
                }
            }
        }

        fn fetch_hydrated_coins(
            &self,
            _address: &str,
        ) -> impl Future<Output = Result<Vec<HydratedCoin>, RpcError>> + Send {
            // Counted at call time: followers of a deduped refresh must
            // never reach this.
            self.coin_calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail_coins.load(Ordering::SeqCst);
            let delay = self.coin_delay;
            let coins = self.coins.lock().unwrap().clone();
            async move {
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }
                if fail {
                    Err(RpcError::Timeout {
                        endpoint: "/coins/unspent/hydrated".to_string(),
                    })
                } else {
                    Ok(coins)
                }
            }
        }
    }

    #[tokio::test]
    async fn test_connect_requires_token() {
        let backend = Arc::new(MockBackend::new(vec![]));
        let engine = SyncEngine::new(backend.clone());
        assert_eq!(engine.connect("").await, Err(WalletError::InvalidToken));
        assert_eq!(engine.connect("   ").await, Err(WalletError::InvalidToken));
        assert_eq!(engine.status().await, ConnectionState::Disconnected);
        assert!(backend.token().is_none());
    }

    #[tokio::test]
    async fn test_connect_populates_state() {
        let backend = Arc::new(MockBackend::new(vec![
            hydrated("750000000000", None),
            hydrated(
                "1",
                Some(DriverInfo::Cat {
                    asset_id: "dd".repeat(32),
                }),
            ),
        ]));
        let engine = SyncEngine::new(backend.clone());

        let state = engine.connect("jwt").await.unwrap();
        assert_eq!(engine.status().await, ConnectionState::Connected);
        assert_eq!(state.address, XCH_ADDR);
        assert_eq!(state.total_balance_mojos, 750_000_000_000);
        assert_eq!(state.coin_count, 2);
        assert_eq!(backend.token().as_deref(), Some("jwt"));

        let snapshot = engine.snapshot().await;
        assert!(snapshot.is_connected());
        assert!(!snapshot.is_refreshing());
        assert!(snapshot.last_error.is_none());
    }

    #[tokio::test]
    async fn test_connect_failure_clears_state_keeps_error() {
        let backend = Arc::new(MockBackend::new(vec![hydrated("1000", None)]));
        backend.fail_keys.store(true, Ordering::SeqCst);
        let engine = SyncEngine::new(backend.clone());

        let err = engine.connect("jwt").await.unwrap_err();
        assert!(matches!(err, WalletError::Rpc(_)));
        assert_eq!(engine.status().await, ConnectionState::ConnectionError);
        assert!(engine.wallet_state().await.is_none());
        assert_eq!(engine.last_error().await, Some(err));
        assert!(backend.token().is_none());
    }

    #[tokio::test]
    async fn test_refresh_requires_connection() {
        let backend = Arc::new(MockBackend::new(vec![]));
        let engine = SyncEngine::new(backend);
        assert_eq!(engine.refresh().await, Err(WalletError::NotConnected));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_deduplicated() {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = Arc::new(
            MockBackend::new(vec![hydrated("1000", None)])
                .with_delay(Duration::from_millis(50)),
        );
        let engine = SyncEngine::new(backend.clone());
        engine.connect("jwt").await.unwrap();
        let calls_after_connect = backend.coin_calls.load(Ordering::SeqCst);

        let (a, b) = tokio::join!(engine.refresh(), engine.refresh());
        let a = a.unwrap();
        let b = b.unwrap();
        // Both callers got the same published snapshot from one fetch.
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(
            backend.coin_calls.load(Ordering::SeqCst),
            calls_after_connect + 1
        );
        assert_eq!(engine.status().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_cancelled_refresh_caller_does_not_wedge_engine() {
        let backend = Arc::new(
            MockBackend::new(vec![hydrated("1000", None)])
                .with_delay(Duration::from_millis(100)),
        );
        let engine = SyncEngine::new(backend.clone());
        engine.connect("jwt").await.unwrap();

        // Caller gives up before the fetch completes; the refresh itself
        // must still run to completion and publish.
        let cancelled =
            tokio::time::timeout(Duration::from_millis(5), engine.refresh()).await;
        assert!(cancelled.is_err());

        let state = engine.refresh().await.unwrap();
        assert_eq!(state.total_balance_mojos, 1000);
        assert_eq!(engine.status().await, ConnectionState::Connected);
        assert!(engine.last_error().await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot_wholesale() {
        let backend = Arc::new(MockBackend::new(vec![
            hydrated("1000", None),
            hydrated("2000", None),
        ]));
        let engine = SyncEngine::new(backend.clone());
        let first = engine.connect("jwt").await.unwrap();
        assert_eq!(first.coin_count, 2);

        backend.set_coins(vec![hydrated("5000", None)]);
        let second = engine.refresh().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.coin_count, 1);
        assert_eq!(second.total_balance_mojos, 5000);
        assert!(second.refreshed_at_ms >= first.refreshed_at_ms);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_stale_snapshot() {
        let backend = Arc::new(MockBackend::new(vec![hydrated("1000", None)]));
        let engine = SyncEngine::new(backend.clone());
        engine.connect("jwt").await.unwrap();

        backend.fail_coins.store(true, Ordering::SeqCst);
        let err = engine.refresh().await.unwrap_err();
        assert!(matches!(err, WalletError::Rpc(_)));
        assert_eq!(engine.status().await, ConnectionState::ConnectionError);
        // The previous snapshot stays readable for staleness-tolerant callers.
        let stale = engine.wallet_state().await.unwrap();
        assert_eq!(stale.total_balance_mojos, 1000);
        assert_eq!(engine.last_error().await, Some(err));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let backend = Arc::new(MockBackend::new(vec![hydrated("1000", None)]));
        let engine = SyncEngine::new(backend.clone());
        engine.connect("jwt").await.unwrap();

        engine.disconnect().await;
        assert_eq!(engine.status().await, ConnectionState::Disconnected);
        assert!(engine.wallet_state().await.is_none());
        assert!(backend.token().is_none());

        engine.disconnect().await;
        assert_eq!(engine.status().await, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_ticks() {
        let backend = Arc::new(MockBackend::new(vec![hydrated("1000", None)]));
        let engine = SyncEngine::with_config(
            backend.clone(),
            SyncConfig {
                refresh_interval: Some(Duration::from_millis(10)),
                ..Default::default()
            },
        );
        engine.connect("jwt").await.unwrap();
        let after_connect = backend.coin_calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(45)).await;
        assert!(backend.coin_calls.load(Ordering::SeqCst) >= after_connect + 2);

        engine.disconnect().await;
        let after_disconnect = backend.coin_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(45)).await;
        // Disconnect cancelled the timer.
        assert_eq!(backend.coin_calls.load(Ordering::SeqCst), after_disconnect);
    }

    #[tokio::test]
    async fn test_is_stale_without_snapshot() {
        let backend = Arc::new(MockBackend::new(vec![]));
        let engine = SyncEngine::new(backend);
        assert!(engine.is_stale().await);
    }
}
