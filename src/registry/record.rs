// Membership Record - One node's heartbeat in the shared store

use crate::config::duration_ms;
use crate::registry::StoreError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Heartbeat written by a node under its own address.
///
/// Only the owning node writes or deletes it. Everyone else just filters it out
/// once `last_seen + ttl` has passed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// PeerAddress of the owning node
    address: String,
    /// When the owner last refreshed the record (unix ms)
    last_seen_ms: i64,
    /// How long the record stays valid after `last_seen_ms`
    ttl_ms: u64,
}

impl MembershipRecord {
    /// Fresh record stamped with the current time
    pub fn new(address: &str, ttl: Duration) -> Self {
        Self {
            address: address.to_string(),
            last_seen_ms: Utc::now().timestamp_millis(),
            ttl_ms: duration_ms(ttl),
        }
    }

    /// Override the timestamp
    pub fn with_last_seen_ms(mut self, last_seen_ms: i64) -> Self {
        self.last_seen_ms = last_seen_ms;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn last_seen_ms(&self) -> i64 {
        self.last_seen_ms
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn expires_at_ms(&self) -> i64 {
        self.last_seen_ms
            .saturating_add(i64::try_from(self.ttl_ms).unwrap_or(i64::MAX))
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// Store key for `address` inside `namespace`
    pub fn key(namespace: &str, address: &str) -> String {
        format!("{}:{}", namespace, address)
    }

    /// Whether this record was stored under `key` in `namespace`.
    ///
    /// Addresses contain `:` themselves, so a prefix match alone would also
    /// pick up keys of a namespace like `<namespace>:blue`.
    pub fn is_stored_under(&self, namespace: &str, key: &[u8]) -> bool {
        key == Self::key(namespace, &self.address).as_bytes()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        postcard::to_allocvec(self).map_err(|e| StoreError::SerializationFailed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        postcard::from_bytes(bytes).map_err(|e| StoreError::DeserializationFailed(e.to_string()))
    }
}
