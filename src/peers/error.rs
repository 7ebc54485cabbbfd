// Peer Errors - Everything the facade can report

use crate::config::ConfigError;
use crate::gossip::ProtocolError;
use crate::identity::ResolveError;
use crate::registry::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by peer backends and the factory
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid config option 'PeerManagement.Type': '{0}'")]
    InvalidPeerManagementType(String),

    #[error("Address resolution failed: {0}")]
    AddressResolution(#[from] ResolveError),

    #[error("Could not reach any of {attempted} bootstrap contact(s)")]
    BootstrapFailed { attempted: usize },

    #[error("Membership store error: {0}")]
    Store(#[from] StoreError),

    #[error("Gossip protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Construction cancelled before setup finished")]
    Cancelled,

    #[error("Shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

impl PeerError {
    /// Misconfiguration: missing/invalid values or an unknown backend
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidPeerManagementType(_))
    }

    /// Errors that stop a backend from being constructed at all
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::ShutdownTimeout(_))
    }
}

impl From<std::io::Error> for PeerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
