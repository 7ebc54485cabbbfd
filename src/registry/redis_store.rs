// RedisStore - Membership records in Redis with native key expiry
//
// Records live under `<namespace>:<address>` and are written with `SET .. PX`
// so Redis drops crashed nodes on its own. The connection is opened lazily and
// thrown away after any failure; the next call reconnects.

use crate::registry::{MembershipRecord, MembershipStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::{Cmd, FromRedisValue};
use tokio::sync::Mutex;

const SCAN_BATCH: usize = 100;

pub struct RedisStore {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    /// Parse the url; no connection is made until the first operation
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        tracing::debug!("connected to redis membership store");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, StoreError> {
        let mut conn = self.connection().await?;
        match cmd.query_async(&mut conn).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.connection.lock().await.take();
                Err(e.into())
            }
        }
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{}:*", namespace);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, batch): (u64, Vec<String>) = self.query(&cmd).await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may repeat keys across batches
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl MembershipStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn put(&self, namespace: &str, record: &MembershipRecord) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(MembershipRecord::key(namespace, record.address()))
            .arg(record.to_bytes()?)
            .arg("PX")
            .arg(record.ttl_ms().max(1));
        let _: () = self.query(&cmd).await?;
        Ok(())
    }

    async fn scan(&self, namespace: &str) -> Result<Vec<MembershipRecord>, StoreError> {
        let keys = self.keys(namespace).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("MGET");
        cmd.arg(&keys);
        let values: Vec<Option<Vec<u8>>> = self.query(&cmd).await?;

        let now = Utc::now().timestamp_millis();
        let mut records = Vec::with_capacity(values.len());
        for (key, value) in keys.iter().zip(values) {
            // expired between SCAN and MGET
            let Some(bytes) = value else { continue };
            match MembershipRecord::from_bytes(&bytes) {
                Ok(record)
                    if record.is_stored_under(namespace, key.as_bytes())
                        && !record.is_expired_at(now) =>
                {
                    records.push(record)
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping undecodable membership record");
                }
            }
        }

        Ok(records)
    }

    async fn remove(&self, namespace: &str, address: &str) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(MembershipRecord::key(namespace, address));
        let _: i64 = self.query(&cmd).await?;
        Ok(())
    }
}
