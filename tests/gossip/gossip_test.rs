// Gossip Tests
// End-to-end membership over real UDP sockets on the loopback interface

use meshpeers::config::{GossipSettings, LiveConfig, PeerManagementConfig};
use meshpeers::gossip::GossipPeers;
use meshpeers::peers::{new_peers, Cancellation, PeerError, PeerManagementType, Peers};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn settings(seeds: &[String]) -> GossipSettings {
    GossipSettings::new("127.0.0.1:0")
        .with_known_members(seeds.iter().cloned())
        .with_probe_interval(Duration::from_millis(50))
        .with_probe_timeout(Duration::from_millis(200))
        .with_suspicion_timeout(Duration::from_millis(600))
        .with_reclaim(Duration::from_secs(5))
        .with_join_timeout(Duration::from_secs(3))
}

fn node_config(peer_port: u16, gossip: GossipSettings) -> LiveConfig {
    LiveConfig::new(
        PeerManagementConfig::new()
            .with_type("member-list")
            .with_peer_listen_addr(&format!("127.0.0.1:{}", peer_port))
            .with_gossip(gossip),
    )
}

async fn start_node(peer_port: u16, seeds: &[String]) -> GossipPeers {
    let config = node_config(peer_port, settings(seeds));
    GossipPeers::start(&config, &Cancellation::new()).await.unwrap()
}

async fn wait_for_peers(node: &GossipPeers, expected: &[&str]) {
    let expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let current = node.get_peers().unwrap();
        if current == expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} never saw {:?}, last view {:?}",
            node.self_address(),
            expected,
            current
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// A UDP socket that never answers
fn silent_seed() -> (std::net::UdpSocket, String) {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = socket.local_addr().unwrap().to_string();
    (socket, addr)
}

// ============================================================================
// FORMING A CLUSTER
// ============================================================================

#[tokio::test]
async fn test_first_node_sees_itself() {
    let node = start_node(9101, &[]).await;

    assert_eq!(node.get_peers().unwrap(), vec!["127.0.0.1:9101".to_string()]);
    assert_eq!(node.gossip_addr().ip().to_string(), "127.0.0.1");
    node.close(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_three_nodes_converge() {
    let a = start_node(9201, &[]).await;
    let seed = vec![a.gossip_addr().to_string()];
    let b = start_node(9202, &seed).await;
    let c = start_node(9203, &seed).await;

    let all = ["127.0.0.1:9201", "127.0.0.1:9202", "127.0.0.1:9203"];
    for node in [&a, &b, &c] {
        wait_for_peers(node, &all).await;
    }

    for node in [&c, &b, &a] {
        node.close(Duration::from_secs(2)).await.unwrap();
    }
}

#[tokio::test]
async fn test_callback_fires_when_member_joins() {
    let a = start_node(9401, &[]).await;
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    a.register_updated_peers_callback(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let b = start_node(9402, &[a.gossip_addr().to_string()]).await;
    wait_for_peers(&a, &["127.0.0.1:9401", "127.0.0.1:9402"]).await;
    assert!(fired.load(Ordering::SeqCst) >= 1);

    b.close(Duration::from_secs(2)).await.unwrap();
    a.close(Duration::from_secs(2)).await.unwrap();
}

// ============================================================================
// LEAVING
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_graceful_leave_propagates() {
    let a = start_node(9501, &[]).await;
    let seed = vec![a.gossip_addr().to_string()];
    let b = start_node(9502, &seed).await;
    let c = start_node(9503, &seed).await;
    wait_for_peers(&b, &["127.0.0.1:9501", "127.0.0.1:9502", "127.0.0.1:9503"]).await;

    c.close(Duration::from_secs(2)).await.unwrap();

    wait_for_peers(&a, &["127.0.0.1:9501", "127.0.0.1:9502"]).await;
    wait_for_peers(&b, &["127.0.0.1:9501", "127.0.0.1:9502"]).await;

    // closing again is a no-op
    c.close(Duration::from_secs(2)).await.unwrap();
    b.close(Duration::from_secs(2)).await.unwrap();
    a.close(Duration::from_secs(2)).await.unwrap();
}

// ============================================================================
// BOOTSTRAP FAILURES
// ============================================================================

#[tokio::test]
async fn test_unanswered_seed_fails_bootstrap() {
    let (_socket, seed) = silent_seed();
    let config = node_config(
        9601,
        settings(&[seed]).with_join_timeout(Duration::from_millis(300)),
    );

    let err = GossipPeers::start(&config, &Cancellation::new()).await.err().unwrap();
    assert!(matches!(err, PeerError::BootstrapFailed { attempted: 1 }));
}

#[tokio::test]
async fn test_cancel_during_bootstrap() {
    let (_socket, seed) = silent_seed();
    let config = node_config(9701, settings(&[seed]));
    let ctx = Cancellation::new();

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let started = tokio::time::Instant::now();
    let err = GossipPeers::start(&config, &ctx).await.err().unwrap();

    assert!(matches!(err, PeerError::Cancelled));
    // well before the three second join timeout
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_factory_builds_gossip_backend() {
    let config = Arc::new(node_config(9801, settings(&[])));
    let peers = new_peers(config, &Cancellation::new()).await.unwrap();

    assert_eq!(peers.kind(), PeerManagementType::Gossip);
    assert_eq!(peers.get_peers().unwrap(), vec!["127.0.0.1:9801".to_string()]);
    peers.close(Duration::from_secs(2)).await.unwrap();
}
