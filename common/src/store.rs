use anyhow::{anyhow, Error, Result};
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tracing::{debug, info};

use crate::status::StatusRecord;

/// TTL'd key-value view of request lifecycles. Injected into the gateway and
/// workers so tests can substitute an in-memory fake.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StatusRecord>, Error>;

    /// Unconditional write; overwrites any prior value.
    async fn put(&self, key: &str, record: &StatusRecord, ttl_seconds: u64) -> Result<(), Error>;

    /// Atomic set-if-absent. Returns `true` when this call created the key.
    async fn put_if_absent(
        &self,
        key: &str,
        record: &StatusRecord,
        ttl_seconds: u64,
    ) -> Result<bool, Error>;
}

pub struct RedisStatusStore {
    connection: MultiplexedConnection,
}

impl RedisStatusStore {
    pub async fn connect(redis_url: &str) -> Result<Self, Error> {
        info!("Connecting to Redis");

        let client =
            Client::open(redis_url).map_err(|e| anyhow!("Failed to create redis client: {}", e))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to redis: {}", e))?;

        info!("Redis connection established");

        Ok(Self { connection })
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn get(&self, key: &str) -> Result<Option<StatusRecord>, Error> {
        let mut conn = self.connection.clone();

        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| anyhow!("Failed to read status record: {}", e))?;

        match value {
            None => Ok(None),
            Some(raw) => {
                let record = serde_json::from_str(&raw)
                    .map_err(|e| anyhow!("Corrupt status record at {}: {}", key, e))?;
                Ok(Some(record))
            }
        }
    }

    async fn put(&self, key: &str, record: &StatusRecord, ttl_seconds: u64) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        let raw = serde_json::to_string(record)?;

        conn.set_ex::<_, _, ()>(key, raw, ttl_seconds)
            .await
            .map_err(|e| anyhow!("Failed to write status record: {}", e))?;

        debug!(key, status = %record.status, "Status record written");

        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        record: &StatusRecord,
        ttl_seconds: u64,
    ) -> Result<bool, Error> {
        let mut conn = self.connection.clone();
        let raw = serde_json::to_string(record)?;

        // SET NX EX: reply is OK when the key was created, nil otherwise.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(raw)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow!("Failed conditional status write: {}", e))?;

        let created = reply.is_some();
        debug!(key, created, "Conditional status write");

        Ok(created)
    }
}
