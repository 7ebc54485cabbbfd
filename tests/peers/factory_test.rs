// Factory Tests
// Tests for building the configured backend through new_peers

use meshpeers::config::{LiveConfig, PeerConfig, PeerManagementConfig, RegistrySettings};
use meshpeers::peers::{new_peers, Cancellation, PeerError, PeerManagementType};
use std::sync::Arc;
use std::time::Duration;

fn live(config: PeerManagementConfig) -> Arc<dyn PeerConfig> {
    Arc::new(LiveConfig::new(config))
}

#[tokio::test]
async fn test_file_backend() {
    let config = live(
        PeerManagementConfig::new()
            .with_type("file")
            .with_peers(["10.0.0.2:8081", "10.0.0.1:8081"]),
    );

    let peers = new_peers(config, &Cancellation::new()).await.unwrap();

    assert_eq!(peers.kind(), PeerManagementType::File);
    assert_eq!(
        peers.get_peers().unwrap(),
        vec!["10.0.0.1:8081".to_string(), "10.0.0.2:8081".to_string()]
    );
    peers.close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_static_alias() {
    let config = live(PeerManagementConfig::new().with_type("Static"));
    let peers = new_peers(config, &Cancellation::new()).await.unwrap();
    assert_eq!(peers.kind(), PeerManagementType::File);
    assert!(peers.get_peers().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_type_rejected() {
    let config = live(PeerManagementConfig::new().with_type("zookeeper"));

    let err = new_peers(config, &Cancellation::new()).await.err().unwrap();

    assert!(matches!(err, PeerError::InvalidPeerManagementType(ref t) if t == "zookeeper"));
    assert!(err.to_string().contains("zookeeper"));
}

#[tokio::test]
async fn test_missing_type_rejected() {
    let config = live(PeerManagementConfig::new().with_type(""));
    let err = new_peers(config, &Cancellation::new()).await.err().unwrap();
    assert!(err.is_configuration_error());
}

#[tokio::test]
async fn test_registry_survives_unreachable_store() {
    // nothing listens on port 1; the backend must still come up
    let config = live(
        PeerManagementConfig::new()
            .with_type("redis")
            .with_peer_listen_addr("10.9.9.9:8081")
            .with_registry(
                RegistrySettings::new("redis://127.0.0.1:1").with_timeout(Duration::from_millis(200)),
            ),
    );

    let peers = new_peers(config, &Cancellation::new()).await.unwrap();

    assert_eq!(peers.kind(), PeerManagementType::Registry);
    assert!(peers.get_peers().is_ok());
    // removing our record fails too, but shutdown itself completes
    let _ = peers.close(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_unsupported_store_url() {
    let config = live(
        PeerManagementConfig::new()
            .with_type("registry")
            .with_peer_listen_addr("10.9.9.9:8081")
            .with_registry(RegistrySettings::new("etcd://127.0.0.1:2379")),
    );

    let err = new_peers(config, &Cancellation::new()).await.err().unwrap();
    assert!(matches!(err, PeerError::Store(_)));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let ctx = Cancellation::new();
    ctx.cancel();

    let config = live(PeerManagementConfig::new().with_type("file"));
    let err = new_peers(config, &ctx).await.err().unwrap();
    assert!(matches!(err, PeerError::Cancelled));
}
