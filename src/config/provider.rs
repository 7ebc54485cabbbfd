// Config Provider - Read-only view of peer configuration
//
// The peer backends only ever talk to `PeerConfig`. Every getter is fallible so
// a misconfigured node fails at construction instead of running on defaults.
// `LiveConfig` is the in-process implementation: it validates on read, can be
// swapped or reloaded from disk, and fans reload notifications out to callbacks.

use crate::config::{GossipSettings, PeerManagementConfig, RegistrySettings};
use crate::peers::CallbackRegistry;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to read configuration: {0}")]
    Io(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Callback invoked when the underlying configuration changes
pub type ReloadCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Read-only configuration consumed by the peer backends
pub trait PeerConfig: Send + Sync {
    /// Backend discriminator (`file`, `redis`, `member-list`, ...)
    fn peer_management_type(&self) -> Result<String, ConfigError>;

    /// host:port the routing layer listens on for peer traffic
    fn peer_listen_addr(&self) -> Result<String, ConfigError>;

    /// Interface to resolve the advertised address from, if any
    fn identifier_interface_name(&self) -> Result<Option<String>, ConfigError>;

    /// Whether IPv6 addresses win during interface resolution
    fn use_ipv6_identifier(&self) -> Result<bool, ConfigError>;

    /// Explicit advertised host, if configured
    fn identifier(&self) -> Result<Option<String>, ConfigError>;

    /// Static peer list
    fn peers(&self) -> Result<Vec<String>, ConfigError>;

    /// Registry backend settings
    fn registry_settings(&self) -> Result<RegistrySettings, ConfigError>;

    /// Gossip backend settings
    fn gossip_settings(&self) -> Result<GossipSettings, ConfigError>;

    /// Be told when the configuration is reloaded
    fn register_reload_callback(&self, callback: ReloadCallback);
}

// ============================================================================
// LIVE CONFIG
// ============================================================================

/// Reloadable in-memory configuration
pub struct LiveConfig {
    current: RwLock<PeerManagementConfig>,
    path: Option<PathBuf>,
    callbacks: CallbackRegistry,
}

impl LiveConfig {
    /// Wrap an already-built configuration
    pub fn new(config: PeerManagementConfig) -> Self {
        Self {
            current: RwLock::new(config),
            path: None,
            callbacks: CallbackRegistry::new(),
        }
    }

    /// Load from a TOML file; `reload_from_file` re-reads the same path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = PeerManagementConfig::from_file(path.as_ref())?;
        Ok(Self {
            current: RwLock::new(config),
            path: Some(path.as_ref().to_path_buf()),
            callbacks: CallbackRegistry::new(),
        })
    }

    /// Copy of the current configuration
    pub fn snapshot(&self) -> PeerManagementConfig {
        self.current.read().clone()
    }

    /// Swap in a new configuration and notify reload callbacks
    pub fn replace(&self, config: PeerManagementConfig) {
        *self.current.write() = config;
        self.reload();
    }

    /// Re-read the backing file. Parse errors keep the previous configuration.
    pub fn reload_from_file(&self) -> Result<(), ConfigError> {
        let path = self
            .path
            .as_ref()
            .ok_or(ConfigError::Missing("config file path"))?;
        let config = PeerManagementConfig::from_file(path)?;
        tracing::info!(path = %path.display(), "configuration reloaded");
        self.replace(config);
        Ok(())
    }

    /// Fire reload callbacks without changing anything
    pub fn reload(&self) {
        self.callbacks.notify();
    }

    fn non_empty(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

impl PeerConfig for LiveConfig {
    fn peer_management_type(&self) -> Result<String, ConfigError> {
        let current = self.current.read();
        let value = current.management_type.trim();
        if value.is_empty() {
            return Err(ConfigError::Missing("type"));
        }
        Ok(value.to_string())
    }

    fn peer_listen_addr(&self) -> Result<String, ConfigError> {
        let current = self.current.read();
        let value = current.peer_listen_addr.trim();
        if value.is_empty() {
            return Err(ConfigError::Missing("peer_listen_addr"));
        }
        match value.rsplit_once(':') {
            Some((_, port)) if port.parse::<u16>().is_ok() => Ok(value.to_string()),
            _ => Err(ConfigError::invalid(
                "peer_listen_addr",
                format!("expected host:port, got '{}'", value),
            )),
        }
    }

    fn identifier_interface_name(&self) -> Result<Option<String>, ConfigError> {
        Ok(Self::non_empty(&self.current.read().identifier_interface_name))
    }

    fn use_ipv6_identifier(&self) -> Result<bool, ConfigError> {
        Ok(self.current.read().use_ipv6_identifier)
    }

    fn identifier(&self) -> Result<Option<String>, ConfigError> {
        Ok(Self::non_empty(&self.current.read().identifier))
    }

    fn peers(&self) -> Result<Vec<String>, ConfigError> {
        let current = self.current.read();
        let mut peers = Vec::with_capacity(current.peers.len());
        for peer in &current.peers {
            let peer = peer.trim();
            if peer.is_empty() {
                return Err(ConfigError::invalid("peers", "entries cannot be empty"));
            }
            peers.push(peer.to_string());
        }
        Ok(peers)
    }

    fn registry_settings(&self) -> Result<RegistrySettings, ConfigError> {
        let settings = self.current.read().registry.clone();
        settings.validate()?;
        Ok(settings)
    }

    fn gossip_settings(&self) -> Result<GossipSettings, ConfigError> {
        let settings = self.current.read().gossip.clone();
        settings.validate()?;
        Ok(settings)
    }

    fn register_reload_callback(&self, callback: ReloadCallback) {
        self.callbacks.register(callback);
    }
}
