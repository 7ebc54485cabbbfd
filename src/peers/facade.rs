// Peers Facade - The one contract the routing layer depends on
//
// `new_peers` reads the backend discriminator, builds exactly one backend and
// hands it back behind `Peers`. Callers never learn which backend is active.

use crate::config::PeerConfig;
use crate::gossip::GossipPeers;
use crate::peers::{Cancellation, FilePeers, PeerError, PeersCallback};
use crate::registry::{open_store, RegistryPeers};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Which membership backend is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerManagementType {
    /// Fixed list from configuration
    File,
    /// Heartbeats in a shared key/value store
    Registry,
    /// Decentralized gossip protocol
    Gossip,
}

impl PeerManagementType {
    /// Canonical configuration value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Registry => "redis",
            Self::Gossip => "member-list",
        }
    }
}

impl fmt::Display for PeerManagementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeerManagementType {
    type Err = PeerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "static" => Ok(Self::File),
            "redis" | "registry" => Ok(Self::Registry),
            "member-list" | "memberlist" | "gossip" => Ok(Self::Gossip),
            _ => Err(PeerError::InvalidPeerManagementType(s.to_string())),
        }
    }
}

/// Uniform membership contract implemented by every backend
#[async_trait]
pub trait Peers: Send + Sync {
    /// Backend behind this handle
    fn kind(&self) -> PeerManagementType;

    /// Current peers, sorted, including this node where the backend registers it.
    ///
    /// Reads the in-memory snapshot only. After `close()` the last snapshot keeps
    /// being returned.
    fn get_peers(&self) -> Result<Vec<String>, PeerError>;

    /// Run `callback` after every detected membership change
    fn register_updated_peers_callback(&self, callback: PeersCallback);

    /// Stop background work within `timeout`. Calling it again is a no-op.
    async fn close(&self, timeout: Duration) -> Result<(), PeerError>;
}

/// Build the backend selected by `config`.
///
/// Cancelling `ctx` aborts a backend whose setup is still in progress.
pub async fn new_peers(
    config: Arc<dyn PeerConfig>,
    ctx: &Cancellation,
) -> Result<Box<dyn Peers>, PeerError> {
    if ctx.is_cancelled() {
        return Err(PeerError::Cancelled);
    }

    let kind: PeerManagementType = config.peer_management_type()?.parse()?;
    tracing::info!(backend = %kind, "starting peer management");

    match kind {
        PeerManagementType::File => Ok(Box::new(FilePeers::new(config)?)),
        PeerManagementType::Registry => {
            let settings = config.registry_settings()?;
            let store = open_store(&settings.url)?;
            let peers = RegistryPeers::start(config.as_ref(), store, ctx).await?;
            Ok(Box::new(peers))
        }
        PeerManagementType::Gossip => {
            let peers = GossipPeers::start(config.as_ref(), ctx).await?;
            Ok(Box::new(peers))
        }
    }
}
