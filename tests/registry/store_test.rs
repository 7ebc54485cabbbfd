// Store Tests
// Tests for the membership stores and store url handling

use meshpeers::registry::{open_store, MembershipRecord, MembershipStore, SledStore, StoreError};
use std::time::Duration;

fn record(address: &str) -> MembershipRecord {
    MembershipRecord::new(address, Duration::from_secs(30))
}

fn addresses(records: &[MembershipRecord]) -> Vec<String> {
    let mut out: Vec<String> = records.iter().map(|r| r.address().to_string()).collect();
    out.sort();
    out
}

// ============================================================================
// SLED STORE
// ============================================================================

#[tokio::test]
async fn test_put_scan_remove() {
    let store = SledStore::temporary().unwrap();

    store.put("edge", &record("10.0.0.1:8081")).await.unwrap();
    store.put("edge", &record("10.0.0.2:8081")).await.unwrap();
    assert_eq!(
        addresses(&store.scan("edge").await.unwrap()),
        vec!["10.0.0.1:8081", "10.0.0.2:8081"]
    );

    store.remove("edge", "10.0.0.1:8081").await.unwrap();
    assert_eq!(addresses(&store.scan("edge").await.unwrap()), vec!["10.0.0.2:8081"]);
}

#[tokio::test]
async fn test_put_refreshes_in_place() {
    let store = SledStore::temporary().unwrap();

    store.put("edge", &record("10.0.0.1:8081")).await.unwrap();
    store.put("edge", &record("10.0.0.1:8081")).await.unwrap();

    assert_eq!(store.scan("edge").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    let store = SledStore::temporary().unwrap();

    store.put("edge", &record("10.0.0.1:8081")).await.unwrap();
    store.put("core", &record("10.0.0.2:8081")).await.unwrap();

    assert_eq!(addresses(&store.scan("edge").await.unwrap()), vec!["10.0.0.1:8081"]);
    assert_eq!(addresses(&store.scan("core").await.unwrap()), vec!["10.0.0.2:8081"]);
    assert!(store.scan("other").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_namespace_sharing_a_prefix_is_isolated() {
    let store = SledStore::temporary().unwrap();

    store.put("edge", &record("10.0.0.1:8081")).await.unwrap();
    store.put("edge:blue", &record("10.0.0.9:8081")).await.unwrap();
    store
        .put("edge:blue", &record("10.0.0.8:8081").with_last_seen_ms(0))
        .await
        .unwrap();

    assert_eq!(addresses(&store.scan("edge").await.unwrap()), vec!["10.0.0.1:8081"]);
    // scanning `edge` must not purge the other namespace's expired record
    assert_eq!(store.len(), 3);
    assert_eq!(addresses(&store.scan("edge:blue").await.unwrap()), vec!["10.0.0.9:8081"]);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_expired_records_hidden_and_purged() {
    let store = SledStore::temporary().unwrap();
    let stale = record("10.0.0.9:8081").with_last_seen_ms(0);

    store.put("edge", &stale).await.unwrap();
    store.put("edge", &record("10.0.0.1:8081")).await.unwrap();
    assert_eq!(store.len(), 2);

    assert_eq!(addresses(&store.scan("edge").await.unwrap()), vec!["10.0.0.1:8081"]);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_remove_missing_is_ok() {
    let store = SledStore::temporary().unwrap();
    assert!(store.remove("edge", "10.0.0.1:8081").await.is_ok());
}

#[tokio::test]
async fn test_clones_share_records() {
    let store = SledStore::temporary().unwrap();
    let other = store.clone();

    store.put("edge", &record("10.0.0.1:8081")).await.unwrap();
    assert_eq!(other.scan("edge").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_persistent_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("members");

    {
        let store = SledStore::open(&path).unwrap();
        store.put("edge", &record("10.0.0.1:8081")).await.unwrap();
        store.flush().unwrap();
    }

    let store = SledStore::open(&path).unwrap();
    assert_eq!(addresses(&store.scan("edge").await.unwrap()), vec!["10.0.0.1:8081"]);
}

// ============================================================================
// STORE URLS
// ============================================================================

#[tokio::test]
async fn test_open_memory_store() {
    let store = open_store("sled://memory").unwrap();
    assert_eq!(store.name(), "sled");

    store.put("edge", &record("10.0.0.1:8081")).await.unwrap();
    assert_eq!(store.scan("edge").await.unwrap().len(), 1);
}

#[test]
fn test_open_redis_is_lazy() {
    // no server needed until the first operation
    let store = open_store("redis://127.0.0.1:1/0").unwrap();
    assert_eq!(store.name(), "redis");
}

#[test]
fn test_unsupported_urls() {
    for url in ["etcd://127.0.0.1:2379", "sled://", "127.0.0.1:6379", ""] {
        assert!(
            matches!(open_store(url), Err(StoreError::UnsupportedUrl(_))),
            "{} should be rejected",
            url
        );
    }
}
