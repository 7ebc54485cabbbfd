// Peer Management Settings - What the node reads at startup
//
// Plain serde structs mirroring the on-disk TOML layout:
// - Top level: backend selection, listen address, identity hints, static peers
// - [registry]: shared store connection and heartbeat timings
// - [gossip]: gossip listen address, seeds and failure-detection timings

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default address the routing layer listens on for peer traffic
pub const DEFAULT_PEER_LISTEN_ADDR: &str = "0.0.0.0:8081";

/// Default gossip listen address (memberlist's conventional port)
pub const DEFAULT_GOSSIP_LISTEN_ADDR: &str = "0.0.0.0:7946";

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

/// Everything the peer subsystem needs from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerManagementConfig {
    /// Backend discriminator: `file`, `redis` or `member-list`
    #[serde(rename = "type")]
    pub management_type: String,
    /// Address (host:port) peers use to reach this node's routing layer
    pub peer_listen_addr: String,
    /// Network interface to take the advertised address from
    pub identifier_interface_name: Option<String>,
    /// Prefer an IPv6 address when resolving from interfaces
    pub use_ipv6_identifier: bool,
    /// Explicit host to advertise, bypasses interface resolution
    pub identifier: Option<String>,
    /// Static peer list for the `file` backend
    pub peers: Vec<String>,
    /// Registry backend settings
    pub registry: RegistrySettings,
    /// Gossip backend settings
    pub gossip: GossipSettings,
}

impl Default for PeerManagementConfig {
    fn default() -> Self {
        Self {
            management_type: "file".to_string(),
            peer_listen_addr: DEFAULT_PEER_LISTEN_ADDR.to_string(),
            identifier_interface_name: None,
            use_ipv6_identifier: false,
            identifier: None,
            peers: Vec::new(),
            registry: RegistrySettings::default(),
            gossip: GossipSettings::default(),
        }
    }
}

impl PeerManagementConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::Io(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn with_type(mut self, management_type: &str) -> Self {
        self.management_type = management_type.to_string();
        self
    }

    pub fn with_peer_listen_addr(mut self, addr: &str) -> Self {
        self.peer_listen_addr = addr.to_string();
        self
    }

    pub fn with_interface_name(mut self, name: &str) -> Self {
        self.identifier_interface_name = Some(name.to_string());
        self
    }

    pub fn with_ipv6_identifier(mut self, prefer_ipv6: bool) -> Self {
        self.use_ipv6_identifier = prefer_ipv6;
        self
    }

    pub fn with_identifier(mut self, host: &str) -> Self {
        self.identifier = Some(host.to_string());
        self
    }

    pub fn with_peers<I, S>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.peers = peers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_registry(mut self, registry: RegistrySettings) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_gossip(mut self, gossip: GossipSettings) -> Self {
        self.gossip = gossip;
        self
    }
}

// ============================================================================
// REGISTRY SETTINGS
// ============================================================================

/// Settings for the registry backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Store location: `redis://host:port`, `sled://<path>` or `sled://memory`
    pub url: String,
    /// Key namespace shared by every member of one cluster
    pub namespace: String,
    /// How often this node rewrites its own record
    pub heartbeat_interval_ms: u64,
    /// How often the namespace is rescanned
    pub scan_interval_ms: u64,
    /// Record expiry; must outlive several heartbeats
    pub record_ttl_ms: u64,
    /// Upper bound for a single store call
    pub timeout_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            namespace: "meshpeers".to_string(),
            heartbeat_interval_ms: 5_000,
            scan_interval_ms: 5_000,
            record_ttl_ms: 30_000,
            timeout_ms: 5_000,
        }
    }
}

impl RegistrySettings {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl_ms = duration_ms(ttl);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_ms(timeout);
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_millis(self.record_ttl_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing("registry.url"));
        }
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Missing("registry.namespace"));
        }
        // keys are `<namespace>:<address>` and scanned with a glob
        if let Some(c) = self
            .namespace
            .chars()
            .find(|c| matches!(c, ':' | '*' | '?' | '[' | ']' | '\\') || c.is_whitespace())
        {
            return Err(ConfigError::invalid(
                "registry.namespace",
                format!("must not contain {:?}", c),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::invalid("registry.heartbeat_interval_ms", "cannot be 0"));
        }
        if self.scan_interval_ms == 0 {
            return Err(ConfigError::invalid("registry.scan_interval_ms", "cannot be 0"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("registry.timeout_ms", "cannot be 0"));
        }
        if self.record_ttl_ms <= self.heartbeat_interval_ms {
            return Err(ConfigError::invalid(
                "registry.record_ttl_ms",
                "must be longer than the heartbeat interval",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// GOSSIP SETTINGS
// ============================================================================

/// Settings for the gossip backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipSettings {
    /// UDP address the gossip protocol binds to
    pub listen_addr: String,
    /// Bootstrap contacts (`host:port`, or a bare host using our gossip port)
    pub known_members: Vec<String>,
    /// Interval between failure-detection probes
    pub probe_interval_ms: u64,
    /// How long a probe may go unanswered before the target is suspected
    pub probe_timeout_ms: u64,
    /// How long a member may stay suspect before it is declared dead
    pub suspicion_timeout_ms: u64,
    /// How long dead/left tombstones are kept
    pub reclaim_ms: u64,
    /// How long construction waits for a seed to answer
    pub join_timeout_ms: u64,
}

impl Default for GossipSettings {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_GOSSIP_LISTEN_ADDR.to_string(),
            known_members: Vec::new(),
            probe_interval_ms: 1_000,
            probe_timeout_ms: 500,
            suspicion_timeout_ms: 5_000,
            reclaim_ms: 30_000,
            join_timeout_ms: 5_000,
        }
    }
}

impl GossipSettings {
    pub fn new(listen_addr: &str) -> Self {
        Self {
            listen_addr: listen_addr.to_string(),
            ..Default::default()
        }
    }

    pub fn with_known_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_members = members.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_suspicion_timeout(mut self, timeout: Duration) -> Self {
        self.suspicion_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_reclaim(mut self, reclaim: Duration) -> Self {
        self.reclaim_ms = duration_ms(reclaim);
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn suspicion_timeout(&self) -> Duration {
        Duration::from_millis(self.suspicion_timeout_ms)
    }

    pub fn reclaim(&self) -> Duration {
        Duration::from_millis(self.reclaim_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.trim().is_empty() {
            return Err(ConfigError::Missing("gossip.listen_addr"));
        }
        if self.probe_interval_ms == 0 {
            return Err(ConfigError::invalid("gossip.probe_interval_ms", "cannot be 0"));
        }
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::invalid("gossip.probe_timeout_ms", "cannot be 0"));
        }
        if self.join_timeout_ms == 0 {
            return Err(ConfigError::invalid("gossip.join_timeout_ms", "cannot be 0"));
        }
        if self.known_members.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "gossip.known_members",
                "entries cannot be empty",
            ));
        }
        Ok(())
    }
}
