// Static List Tests
// Tests for the file backend and its reaction to configuration reloads

use meshpeers::config::{LiveConfig, PeerConfig, PeerManagementConfig};
use meshpeers::peers::{FilePeers, Peers};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config_with(peers: &[&str]) -> PeerManagementConfig {
    PeerManagementConfig::new()
        .with_type("file")
        .with_peers(peers.iter().copied())
}

fn counting_callback(counter: &Arc<AtomicUsize>) -> Box<dyn Fn() + Send + Sync> {
    let counter = counter.clone();
    Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_duplicates_collapse() {
    let config = Arc::new(LiveConfig::new(config_with(&[
        "10.0.0.1:8081",
        "10.0.0.1:8081",
        "10.0.0.2:8081",
    ])));

    let peers = FilePeers::new(config).unwrap();
    assert_eq!(peers.get_peers().unwrap().len(), 2);
}

#[test]
fn test_reload_updates_and_notifies() {
    let config = Arc::new(LiveConfig::new(config_with(&["10.0.0.1:8081"])));
    let peers = FilePeers::new(config.clone()).unwrap();

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    peers.register_updated_peers_callback(counting_callback(&first));
    peers.register_updated_peers_callback(counting_callback(&second));

    config.replace(config_with(&["10.0.0.1:8081", "10.0.0.3:8081"]));

    assert_eq!(
        peers.get_peers().unwrap(),
        vec!["10.0.0.1:8081".to_string(), "10.0.0.3:8081".to_string()]
    );
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn test_reload_without_change_is_silent() {
    let config = Arc::new(LiveConfig::new(config_with(&["10.0.0.1:8081", "10.0.0.2:8081"])));
    let peers = FilePeers::new(config.clone()).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    peers.register_updated_peers_callback(counting_callback(&fired));

    // same set, different order
    config.replace(config_with(&["10.0.0.2:8081", "10.0.0.1:8081"]));
    config.reload();

    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_invalid_reload_keeps_last_list() {
    let config = Arc::new(LiveConfig::new(config_with(&["10.0.0.1:8081"])));
    let peers = FilePeers::new(config.clone()).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    peers.register_updated_peers_callback(counting_callback(&fired));

    config.replace(config_with(&["10.0.0.1:8081", "  "]));

    assert_eq!(peers.get_peers().unwrap(), vec!["10.0.0.1:8081".to_string()]);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_invalid_initial_list_fails_construction() {
    let config = Arc::new(LiveConfig::new(config_with(&[""])));
    let err = FilePeers::new(config).err().unwrap();
    assert!(err.is_configuration_error());
}

#[tokio::test]
async fn test_closed_backend_ignores_reloads() {
    let config = Arc::new(LiveConfig::new(config_with(&["10.0.0.1:8081"])));
    let peers = FilePeers::new(config.clone()).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    peers.register_updated_peers_callback(counting_callback(&fired));

    peers.close(Duration::from_secs(1)).await.unwrap();
    peers.close(Duration::from_secs(1)).await.unwrap();
    config.replace(config_with(&["10.0.0.9:8081"]));

    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(peers.get_peers().unwrap(), vec!["10.0.0.1:8081".to_string()]);
}

#[test]
fn test_dropped_backend_detaches_from_config() {
    let config = Arc::new(LiveConfig::new(config_with(&["10.0.0.1:8081"])));
    drop(FilePeers::new(config.clone()).unwrap());

    // the reload hook must not outlive the backend's state
    config.replace(config_with(&["10.0.0.2:8081"]));
    assert_eq!(config.peers().unwrap(), vec!["10.0.0.2:8081".to_string()]);
}
