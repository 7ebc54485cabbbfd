// Membership Store - The rendezvous point shared by every registry member
//
// Implementations only need three operations: write my record with an expiry,
// list every live record in a namespace, and drop my record on the way out.

use crate::registry::{MembershipRecord, RedisStore, SledStore};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors from store operations. Inside the registry loops these are transient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    OpenFailed(String),

    #[error("Unsupported store url '{0}': expected redis://, rediss:// or sled://")]
    UnsupportedUrl(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Store operation timed out")]
    Timeout,
}

impl StoreError {
    /// Worth retrying on the next tick
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::DatabaseError(_) | Self::Timeout
        )
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::DatabaseError(err.to_string())
        }
    }
}

/// Shared key/value store holding membership records
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Write (or refresh) a record; it must vanish after `record.ttl_ms()`
    async fn put(&self, namespace: &str, record: &MembershipRecord) -> Result<(), StoreError>;

    /// Every unexpired record in `namespace`
    async fn scan(&self, namespace: &str) -> Result<Vec<MembershipRecord>, StoreError>;

    /// Delete the record for `address`
    async fn remove(&self, namespace: &str, address: &str) -> Result<(), StoreError>;
}

/// Open the store a registry url points at.
///
/// `redis://` / `rediss://` connect lazily, so a store that is down at startup
/// only delays the first heartbeat. `sled://memory` is a throwaway embedded
/// database; `sled://<path>` persists under `<path>`.
pub fn open_store(url: &str) -> Result<Arc<dyn MembershipStore>, StoreError> {
    let url = url.trim();

    if url.starts_with("redis://") || url.starts_with("rediss://") {
        return Ok(Arc::new(RedisStore::open(url)?));
    }

    if let Some(location) = url.strip_prefix("sled://") {
        let store = match location {
            "" => return Err(StoreError::UnsupportedUrl(url.to_string())),
            "memory" => SledStore::temporary()?,
            path => SledStore::open(path)?,
        };
        return Ok(Arc::new(store));
    }

    Err(StoreError::UnsupportedUrl(url.to_string()))
}
