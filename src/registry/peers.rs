// Registry Backend - Membership through a shared store
//
// Each node keeps its own record alive with periodic heartbeats and rebuilds
// its view of the cluster by scanning the namespace on a separate cadence.
// Store trouble never tears the backend down: the last good set is served and
// both loops try again on their next tick.

use crate::config::{PeerConfig, RegistrySettings};
use crate::identity::advertised_address;
use crate::peers::{
    CallbackRegistry, Cancellation, PeerCache, PeerError, PeerManagementType, PeerSet, Peers,
    PeersCallback,
};
use crate::registry::{MembershipRecord, MembershipStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

struct RegistryState {
    store: Arc<dyn MembershipStore>,
    settings: RegistrySettings,
    self_address: String,
    cache: PeerCache,
    callbacks: CallbackRegistry,
    /// Unix ms of the last successful scan, 0 before the first one
    last_scan_ms: AtomicI64,
}

impl RegistryState {
    async fn heartbeat(&self) -> Result<(), StoreError> {
        let record = MembershipRecord::new(&self.self_address, self.settings.record_ttl());
        time::timeout(
            self.settings.timeout(),
            self.store.put(&self.settings.namespace, &record),
        )
        .await
        .map_err(|_| StoreError::Timeout)?
    }

    /// Rebuild the view from the store. Returns whether the set changed.
    async fn scan(&self) -> Result<bool, StoreError> {
        let records = time::timeout(
            self.settings.timeout(),
            self.store.scan(&self.settings.namespace),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        let now = Utc::now().timestamp_millis();
        self.last_scan_ms.store(now, Ordering::Release);
        let mut next: PeerSet = records
            .iter()
            .filter(|r| !r.is_expired_at(now))
            .map(|r| r.address().to_string())
            .collect();
        // a missed heartbeat must not drop us from our own view
        next.insert(self.self_address.clone());

        let count = next.len();
        if !self.cache.replace_if_changed(next) {
            return Ok(false);
        }

        tracing::info!(peers = count, namespace = %self.settings.namespace, "registry peer set changed");
        self.callbacks.notify();
        Ok(true)
    }

    async fn heartbeat_loop(self: Arc<Self>, stop: Cancellation) {
        let mut ticker = time::interval_at(
            Instant::now() + self.settings.heartbeat_interval(),
            self.settings.heartbeat_interval(),
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.heartbeat().await {
                        tracing::warn!(
                            address = %self.self_address,
                            error = %e,
                            "heartbeat failed, retrying next interval"
                        );
                    }
                }
            }
        }

        tracing::debug!(address = %self.self_address, "heartbeat loop stopped");
    }

    async fn scan_loop(self: Arc<Self>, stop: Cancellation) {
        let mut ticker = time::interval(self.settings.scan_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.scan().await {
                        tracing::warn!(error = %e, "registry scan failed, keeping last peer set");
                    }
                }
            }
        }

        tracing::debug!(address = %self.self_address, "scan loop stopped");
    }
}

/// Registry-backed peer management
pub struct RegistryPeers {
    state: Arc<RegistryState>,
    stop: Cancellation,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl RegistryPeers {
    /// Register with `store` and start the heartbeat and scan loops.
    ///
    /// An unreachable store is not fatal here; the loops keep retrying. Only
    /// configuration, address resolution and cancellation fail construction.
    pub async fn start(
        config: &dyn PeerConfig,
        store: Arc<dyn MembershipStore>,
        ctx: &Cancellation,
    ) -> Result<Self, PeerError> {
        if ctx.is_cancelled() {
            return Err(PeerError::Cancelled);
        }

        let settings = config.registry_settings()?;
        let self_address = advertised_address(config)?;

        tracing::info!(
            address = %self_address,
            namespace = %settings.namespace,
            store = store.name(),
            "registering with membership store"
        );

        let state = Arc::new(RegistryState {
            store,
            settings,
            self_address,
            cache: PeerCache::default(),
            callbacks: CallbackRegistry::new(),
            last_scan_ms: AtomicI64::new(0),
        });

        tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(PeerError::Cancelled),
            result = state.heartbeat() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "initial heartbeat failed, will retry");
                }
            }
        }

        let stop = Cancellation::new();
        let tasks = vec![
            tokio::spawn(state.clone().heartbeat_loop(stop.clone())),
            tokio::spawn(state.clone().scan_loop(stop.clone())),
        ];

        Ok(Self {
            state,
            stop,
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
        })
    }

    /// The PeerAddress this node registers under
    pub fn self_address(&self) -> &str {
        &self.state.self_address
    }

    pub fn namespace(&self) -> &str {
        &self.state.settings.namespace
    }

    /// When the store was last read successfully
    pub fn last_successful_scan(&self) -> Option<DateTime<Utc>> {
        match self.state.last_scan_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }

    /// The cached view has not been confirmed by the store for longer than a
    /// record lives, so departures may be missing from it
    pub fn is_stale(&self) -> bool {
        let ttl_ms = i64::try_from(self.state.settings.record_ttl_ms).unwrap_or(i64::MAX);
        match self.state.last_scan_ms.load(Ordering::Acquire) {
            0 => true,
            last => Utc::now().timestamp_millis().saturating_sub(last) > ttl_ms,
        }
    }

    /// Scan immediately instead of waiting for the next tick
    pub async fn refresh(&self) -> Result<bool, PeerError> {
        Ok(self.state.scan().await?)
    }
}

#[async_trait]
impl Peers for RegistryPeers {
    fn kind(&self) -> PeerManagementType {
        PeerManagementType::Registry
    }

    fn get_peers(&self) -> Result<Vec<String>, PeerError> {
        Ok(self.state.cache.peers())
    }

    fn register_updated_peers_callback(&self, callback: PeersCallback) {
        self.state.callbacks.register(callback);
    }

    async fn close(&self, timeout: Duration) -> Result<(), PeerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        self.stop.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        let mut timed_out = false;
        for handle in tasks {
            let abort = handle.abort_handle();
            if time::timeout_at(deadline, handle).await.is_err() {
                abort.abort();
                timed_out = true;
            }
        }
        if timed_out {
            tracing::warn!(address = %self.state.self_address, "registry tasks did not stop in time");
            return Err(PeerError::ShutdownTimeout(timeout));
        }

        let namespace = &self.state.settings.namespace;
        let address = &self.state.self_address;
        match time::timeout_at(deadline, self.state.store.remove(namespace, address)).await {
            Ok(Ok(())) => {
                tracing::info!(address = %address, "deregistered from membership store");
                Ok(())
            }
            Ok(Err(e)) => {
                // the record still expires on its own
                tracing::warn!(address = %address, error = %e, "failed to remove membership record");
                Err(e.into())
            }
            Err(_) => Err(PeerError::ShutdownTimeout(timeout)),
        }
    }
}
