// Gossip module - MEMBERSHIP WITHOUT A CENTRAL STORE
// SWIM-style failure detection with full-table piggybacking over UDP

mod engine;
mod peers;
mod protocol;

pub use engine::{GossipConfig, GossipEngine, GossipEvent, GossipStats};
pub use peers::GossipPeers;
pub use protocol::{Member, MemberState, Message, ProtocolError, MAX_DATAGRAM_SIZE};
