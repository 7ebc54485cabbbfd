// Config Tests
// Tests for loading, validating and reloading peer management configuration

use meshpeers::config::{
    ConfigError, GossipSettings, LiveConfig, PeerConfig, PeerManagementConfig, RegistrySettings,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const REGISTRY_TOML: &str = r#"
type = "redis"
peer_listen_addr = "10.1.0.7:8081"
identifier = "router-7.internal"

[registry]
url = "redis://cache.internal:6379"
namespace = "edge"
heartbeat_interval_ms = 1000
record_ttl_ms = 4000
"#;

fn write_config(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("peers.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

// ============================================================================
// LOADING
// ============================================================================

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, REGISTRY_TOML);

    let config = LiveConfig::from_file(&path).unwrap();

    assert_eq!(config.peer_management_type().unwrap(), "redis");
    assert_eq!(config.peer_listen_addr().unwrap(), "10.1.0.7:8081");
    assert_eq!(config.identifier().unwrap().as_deref(), Some("router-7.internal"));

    let registry = config.registry_settings().unwrap();
    assert_eq!(registry.url, "redis://cache.internal:6379");
    assert_eq!(registry.namespace, "edge");
    assert_eq!(registry.heartbeat_interval(), Duration::from_secs(1));
    assert_eq!(registry.record_ttl(), Duration::from_secs(4));
    // not in the file
    assert_eq!(registry.scan_interval_ms, RegistrySettings::default().scan_interval_ms);
}

#[test]
fn test_empty_document_uses_defaults() {
    let config = PeerManagementConfig::from_toml_str("").unwrap();
    assert_eq!(config, PeerManagementConfig::default());
}

#[test]
fn test_missing_file_is_io_error() {
    let result = LiveConfig::from_file("/definitely/not/here/peers.toml");
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let result = PeerManagementConfig::from_toml_str("type = [unterminated");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

// ============================================================================
// VALIDATION ON READ
// ============================================================================

#[test]
fn test_blank_identifier_treated_as_unset() {
    let config = LiveConfig::new(PeerManagementConfig::new().with_identifier("   "));
    assert_eq!(config.identifier().unwrap(), None);
}

#[test]
fn test_peer_entries_trimmed_and_checked() {
    let config = LiveConfig::new(
        PeerManagementConfig::new().with_peers([" 10.0.0.1:8081 ", "10.0.0.2:8081"]),
    );
    assert_eq!(
        config.peers().unwrap(),
        vec!["10.0.0.1:8081".to_string(), "10.0.0.2:8081".to_string()]
    );

    let config = LiveConfig::new(PeerManagementConfig::new().with_peers(["10.0.0.1:8081", ""]));
    assert!(matches!(
        config.peers(),
        Err(ConfigError::Invalid { field: "peers", .. })
    ));
}

#[test]
fn test_invalid_gossip_settings_surface_on_read() {
    let config = LiveConfig::new(
        PeerManagementConfig::new()
            .with_gossip(GossipSettings::new("0.0.0.0:7946").with_probe_interval(Duration::ZERO)),
    );
    assert!(matches!(
        config.gossip_settings(),
        Err(ConfigError::Invalid { field: "gossip.probe_interval_ms", .. })
    ));
}

#[test]
fn test_namespace_with_key_separator_rejected() {
    for namespace in ["edge:blue", "edge*", "edge blue"] {
        let config = LiveConfig::new(
            PeerManagementConfig::new()
                .with_registry(RegistrySettings::new("sled://memory").with_namespace(namespace)),
        );
        assert!(
            matches!(
                config.registry_settings(),
                Err(ConfigError::Invalid { field: "registry.namespace", .. })
            ),
            "{} accepted",
            namespace
        );
    }
}

#[test]
fn test_huge_durations_saturate() {
    let settings = RegistrySettings::new("sled://memory").with_record_ttl(Duration::MAX);
    assert_eq!(settings.record_ttl_ms, u64::MAX);
}

// ============================================================================
// RELOAD
// ============================================================================

#[test]
fn test_reload_from_file_applies_and_notifies() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "type = \"file\"\npeers = [\"10.0.0.1:8081\"]\n");
    let config = LiveConfig::from_file(&path).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    config.register_reload_callback(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    std::fs::write(&path, "type = \"file\"\npeers = [\"10.0.0.1:8081\", \"10.0.0.2:8081\"]\n")
        .unwrap();
    config.reload_from_file().unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(config.peers().unwrap().len(), 2);
}

#[test]
fn test_reload_with_broken_file_keeps_previous() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "type = \"file\"\npeers = [\"10.0.0.1:8081\"]\n");
    let config = LiveConfig::from_file(&path).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    config.register_reload_callback(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    std::fs::write(&path, "peers = [").unwrap();
    assert!(matches!(config.reload_from_file(), Err(ConfigError::Parse(_))));

    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(config.peers().unwrap(), vec!["10.0.0.1:8081".to_string()]);
}

#[test]
fn test_reload_needs_a_backing_file() {
    let config = LiveConfig::new(PeerManagementConfig::default());
    assert!(matches!(config.reload_from_file(), Err(ConfigError::Missing(_))));
}
