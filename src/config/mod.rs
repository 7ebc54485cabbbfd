// Config module - WHAT THE NODE WAS TOLD
// Peer management settings and the read-only provider the backends consume

mod provider;
mod settings;

pub use provider::{ConfigError, LiveConfig, PeerConfig, ReloadCallback};
pub use settings::{
    duration_ms, GossipSettings, PeerManagementConfig, RegistrySettings, DEFAULT_GOSSIP_LISTEN_ADDR,
    DEFAULT_PEER_LISTEN_ADDR,
};
