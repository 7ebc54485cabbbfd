// SledStore - Embedded membership store using sled
//
// For single-process clusters and tests: every backend holding a clone of the
// same `SledStore` sees the same records. sled has no native expiry, so scans
// skip expired records and purge them as they go.

use crate::registry::{MembershipRecord, MembershipStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;

/// sled-backed membership store
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    /// In-memory store that is deleted when the last clone drops
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Raw number of stored records, expired ones included
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    fn prefix(namespace: &str) -> Vec<u8> {
        format!("{}:", namespace).into_bytes()
    }
}

#[async_trait]
impl MembershipStore for SledStore {
    fn name(&self) -> &'static str {
        "sled"
    }

    async fn put(&self, namespace: &str, record: &MembershipRecord) -> Result<(), StoreError> {
        let key = MembershipRecord::key(namespace, record.address());
        self.db.insert(key.as_bytes(), record.to_bytes()?)?;
        Ok(())
    }

    async fn scan(&self, namespace: &str) -> Result<Vec<MembershipRecord>, StoreError> {
        let now = Utc::now().timestamp_millis();
        let mut live = Vec::new();
        let mut expired = Vec::new();

        for entry in self.db.scan_prefix(Self::prefix(namespace)) {
            let (key, value) = entry?;
            match MembershipRecord::from_bytes(&value) {
                // another namespace sharing our prefix
                Ok(record) if !record.is_stored_under(namespace, &key) => {}
                Ok(record) if record.is_expired_at(now) => expired.push((key, value)),
                Ok(record) => live.push(record),
                Err(e) => {
                    tracing::warn!(
                        key = %String::from_utf8_lossy(&key),
                        error = %e,
                        "skipping undecodable membership record"
                    );
                }
            }
        }

        // only delete what we saw; a concurrent refresh wins
        for (key, value) in expired {
            let _ = self.db.compare_and_swap(key, Some(value), None as Option<&[u8]>)?;
        }

        Ok(live)
    }

    async fn remove(&self, namespace: &str, address: &str) -> Result<(), StoreError> {
        let key = MembershipRecord::key(namespace, address);
        self.db.remove(key.as_bytes())?;
        Ok(())
    }
}
