// meshpeers - Peer membership for clustered routing services
//
// Answers one question for the rest of the process: which nodes are in the
// cluster right now? Three interchangeable backends sit behind `Peers`:
// - file: a static list from configuration, refreshed on reload
// - registry: heartbeat records with expiry in a shared store
// - gossip: SWIM-style failure detection over UDP

pub mod config;
pub mod gossip;
pub mod identity;
pub mod peers;
pub mod registry;

pub use config::{LiveConfig, PeerConfig, PeerManagementConfig};
pub use peers::{new_peers, Cancellation, PeerError, PeerManagementType, Peers, PeersCallback};
