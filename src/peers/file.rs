// Static List Backend - Peers straight from configuration
//
// No background work. The list is re-read whenever the configuration reloads
// and callbacks fire only when the resulting set actually differs.

use crate::config::PeerConfig;
use crate::peers::{
    CallbackRegistry, PeerCache, PeerError, PeerManagementType, PeerSet, Peers, PeersCallback,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct FileState {
    config: Arc<dyn PeerConfig>,
    cache: PeerCache,
    callbacks: CallbackRegistry,
    closed: AtomicBool,
}

impl FileState {
    fn reload(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        match self.config.peers() {
            Ok(peers) => {
                let next: PeerSet = peers.into_iter().collect();
                let count = next.len();
                if self.cache.replace_if_changed(next) {
                    tracing::info!(peers = count, "static peer list changed");
                    self.callbacks.notify();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring invalid peer list on reload");
            }
        }
    }
}

/// Static peer list backend
pub struct FilePeers {
    state: Arc<FileState>,
}

impl FilePeers {
    /// Read the configured list and hook into configuration reloads
    pub fn new(config: Arc<dyn PeerConfig>) -> Result<Self, PeerError> {
        let initial: PeerSet = config.peers()?.into_iter().collect();
        tracing::debug!(peers = initial.len(), "static peer list loaded");

        let state = Arc::new(FileState {
            config: config.clone(),
            cache: PeerCache::new(initial),
            callbacks: CallbackRegistry::new(),
            closed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&state);
        config.register_reload_callback(Box::new(move || {
            if let Some(state) = weak.upgrade() {
                state.reload();
            }
        }));

        Ok(Self { state })
    }
}

#[async_trait]
impl Peers for FilePeers {
    fn kind(&self) -> PeerManagementType {
        PeerManagementType::File
    }

    fn get_peers(&self) -> Result<Vec<String>, PeerError> {
        Ok(self.state.cache.peers())
    }

    fn register_updated_peers_callback(&self, callback: PeersCallback) {
        self.state.callbacks.register(callback);
    }

    async fn close(&self, _timeout: Duration) -> Result<(), PeerError> {
        // the config may outlive us; the reload hook goes inert instead of away
        self.state.closed.store(true, Ordering::Release);
        Ok(())
    }
}
