//! Redis ledger backend
//!
//! Each event is a hash at `{prefix}:event:{id}` with one field per
//! published stage. `HSETNX` makes recording a publication atomic across
//! processes sharing the same Redis.

use std::collections::HashMap;

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use ::redis::AsyncCommands;

use crate::models::{EventId, Stage};
use crate::storage::ledger::{LedgerStore, StageFlags};
use crate::utils::error::LedgerError;

/// Ledger stored in Redis hashes
pub struct RedisLedgerStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisLedgerStore {
    /// Connect to Redis and verify the connection
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self, LedgerError> {
        let pool = PoolConfig::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| LedgerError::Unavailable(format!("failed to create pool: {e}")))?;

        let mut conn = pool.get().await?;
        let _: String = ::redis::cmd("PING").query_async(&mut *conn).await?;

        tracing::info!(url = %url, "Connected to Redis ledger");

        Ok(Self {
            pool,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, event_id: EventId) -> String {
        event_key(&self.key_prefix, event_id)
    }
}

fn event_key(prefix: &str, event_id: EventId) -> String {
    format!("{prefix}:event:{event_id}")
}

fn flags_from_hash(hash: &HashMap<String, String>) -> StageFlags {
    let mut flags = StageFlags::default();
    for stage in Stage::all() {
        if hash.get(stage.as_str()).is_some_and(|v| v != "0") {
            flags.set(stage);
        }
    }
    flags
}

#[async_trait]
impl LedgerStore for RedisLedgerStore {
    async fn get(&self, event_id: EventId) -> Result<StageFlags, LedgerError> {
        let mut conn = self.pool.get().await?;
        let hash: HashMap<String, String> = conn.hgetall(self.key(event_id)).await?;
        Ok(flags_from_hash(&hash))
    }

    async fn put(&self, event_id: EventId, flags: StageFlags) -> Result<(), LedgerError> {
        let mut conn = self.pool.get().await?;
        let key = self.key(event_id);
        for stage in flags.published_stages() {
            let _: bool = conn.hset_nx(&key, stage.as_str(), "1").await?;
        }
        Ok(())
    }

    async fn mark(&self, event_id: EventId, stage: Stage) -> Result<bool, LedgerError> {
        let mut conn = self.pool.get().await?;
        let newly_set: bool = conn.hset_nx(self.key(event_id), stage.as_str(), "1").await?;
        Ok(newly_set)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_key() {
        assert_eq!(event_key("matchday", EventId(1208021)), "matchday:event:1208021");
    }

    #[test]
    fn test_flags_from_hash() {
        let mut hash = HashMap::new();
        hash.insert("pre_event".to_string(), "1".to_string());
        hash.insert("post_event".to_string(), "0".to_string());
        hash.insert("unrelated".to_string(), "1".to_string());

        let flags = flags_from_hash(&hash);
        assert_eq!(flags.published_stages(), vec![Stage::PreEvent]);
    }
}
