// Protocol - Datagrams exchanged by gossip members
//
// Every Ping and Ack carries the sender's whole member table, so membership
// spreads on the back of failure detection with no separate broadcast path.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use thiserror::Error;

/// Largest datagram we put on the wire
pub const MAX_DATAGRAM_SIZE: usize = 65_000;

/// Protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Liveness of a member as seen by the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberState {
    /// Answering probes
    Alive,
    /// Missed a probe; still counted as a peer until confirmed dead
    Suspect,
    /// Stayed suspect past the suspicion timeout
    Dead,
    /// Announced its own departure
    Left,
}

impl MemberState {
    /// Counted in the peer set
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Alive | Self::Suspect)
    }

    /// Order applied when two rumors carry the same incarnation
    fn precedence(&self) -> u8 {
        match self {
            Self::Alive => 0,
            Self::Suspect => 1,
            Self::Dead => 2,
            Self::Left => 3,
        }
    }
}

/// One entry of the member table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Where the member's gossip socket listens; its identity in the table
    gossip_addr: SocketAddr,
    /// PeerAddress reported to the application
    peer_addr: String,
    state: MemberState,
    /// Only the member itself raises this, to refute rumors about it
    incarnation: u64,
}

impl Member {
    /// A freshly alive member at incarnation 0
    pub fn new(gossip_addr: SocketAddr, peer_addr: &str) -> Self {
        Self {
            gossip_addr,
            peer_addr: peer_addr.to_string(),
            state: MemberState::Alive,
            incarnation: 0,
        }
    }

    pub fn with_state(mut self, state: MemberState) -> Self {
        self.state = state;
        self
    }

    pub fn with_incarnation(mut self, incarnation: u64) -> Self {
        self.incarnation = incarnation;
        self
    }

    pub fn gossip_addr(&self) -> SocketAddr {
        self.gossip_addr
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn state(&self) -> MemberState {
        self.state
    }

    pub fn incarnation(&self) -> u64 {
        self.incarnation
    }

    pub(crate) fn set_state(&mut self, state: MemberState) {
        self.state = state;
    }

    pub(crate) fn set_incarnation(&mut self, incarnation: u64) {
        self.incarnation = incarnation;
    }

    /// Whether this rumor should replace `other`.
    ///
    /// A higher incarnation always wins; at equal incarnation
    /// Left > Dead > Suspect > Alive.
    pub fn supersedes(&self, other: &Member) -> bool {
        self.incarnation > other.incarnation
            || (self.incarnation == other.incarnation
                && self.state.precedence() > other.state.precedence())
    }
}

/// Wrapper for all message types
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Ask a seed to take us in; answered with an Ack carrying its table
    Join { from: Member },
    /// Failure-detection probe
    Ping {
        seq: u64,
        from: Member,
        members: Vec<Member>,
    },
    /// Probe answer
    Ack {
        seq: u64,
        from: Member,
        members: Vec<Member>,
    },
    /// Graceful departure
    Leave { member: Member },
}

impl Message {
    /// Member that produced the message
    pub fn sender(&self) -> &Member {
        match self {
            Message::Join { from } => from,
            Message::Ping { from, .. } => from,
            Message::Ack { from, .. } => from,
            Message::Leave { member } => member,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Join { .. } => "join",
            Message::Ping { .. } => "ping",
            Message::Ack { .. } => "ack",
            Message::Leave { .. } => "leave",
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = postcard::to_allocvec(self)
            .map_err(|e| ProtocolError::SerializationFailed(e.to_string()))?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: bytes.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        Ok(bytes)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: bytes.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        postcard::from_bytes(bytes).map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))
    }
}
