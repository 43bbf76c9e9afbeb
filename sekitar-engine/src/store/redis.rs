use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value;

use sekitar_shared::clients::redis::RedisClient;
use sekitar_shared::errors::StoreError;

use super::{Collection, DocumentStore, TxAction, TxFn};

const KEY_PREFIX: &str = "sekitar";
const MAX_TX_ATTEMPTS: u32 = 16;
const MGET_CHUNK: usize = 200;

/// Documents stored as JSON strings under `sekitar:{collection}:{key}`.
pub struct RedisStore {
    redis: RedisClient,
}

impl RedisStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    fn key(collection: Collection, key: &str) -> String {
        format!("{KEY_PREFIX}:{}:{key}", collection.as_str())
    }

    /// `MGET` batches, so no single command carries an unbounded key list.
    fn mget_batches(keys: &[String]) -> std::slice::Chunks<'_, String> {
        keys.chunks(MGET_CHUNK)
    }

    fn parse(raw: Option<String>) -> Result<Option<Value>, StoreError> {
        Ok(raw.as_deref().map(serde_json::from_str).transpose()?)
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError> {
        Self::parse(self.redis.get(&Self::key(collection, key)).await?)
    }

    async fn get_many(
        &self,
        collection: Collection,
        keys: &[String],
    ) -> Result<Vec<Option<Value>>, StoreError> {
        let redis_keys: Vec<String> = keys.iter().map(|k| Self::key(collection, k)).collect();

        let mut docs = Vec::with_capacity(redis_keys.len());
        for chunk in Self::mget_batches(&redis_keys) {
            for raw in self.redis.mget(chunk).await? {
                docs.push(Self::parse(raw)?);
            }
        }
        Ok(docs)
    }

    async fn set(&self, collection: Collection, key: &str, doc: Value) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&doc)?;
        Ok(self.redis.set(&Self::key(collection, key), &payload).await?)
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<(), StoreError> {
        Ok(self.redis.del(&Self::key(collection, key)).await?)
    }

    /// Optimistic `WATCH`/`MULTI`/`EXEC`, retried while another writer wins the race.
    async fn transaction(
        &self,
        collection: Collection,
        key: &str,
        f: &mut TxFn<'_>,
    ) -> Result<(), StoreError> {
        let redis_key = Self::key(collection, key);
        let mut conn = self.redis.dedicated_connection().await?;

        for attempt in 1..=MAX_TX_ATTEMPTS {
            redis::cmd("WATCH")
                .arg(&redis_key)
                .query_async::<_, ()>(&mut conn)
                .await?;
            let raw: Option<String> = conn.get(&redis_key).await?;

            match f(Self::parse(raw)?) {
                TxAction::Keep => {
                    redis::cmd("UNWATCH").query_async::<_, ()>(&mut conn).await?;
                    return Ok(());
                }
                TxAction::Write(next) => {
                    let payload = serde_json::to_string(&next)?;
                    // EXEC replies nil when the watched key changed underneath us.
                    let committed: Option<()> = redis::pipe()
                        .atomic()
                        .set(&redis_key, payload)
                        .ignore()
                        .query_async(&mut conn)
                        .await?;
                    if committed.is_some() {
                        return Ok(());
                    }
                    tracing::debug!(key = %redis_key, attempt, "transaction conflict, retrying");
                }
            }
        }

        tracing::warn!(key = %redis_key, "transaction gave up after repeated conflicts");
        Err(StoreError::Conflict(MAX_TX_ATTEMPTS))
    }

    async fn scan_all(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        let pattern = format!("{KEY_PREFIX}:{}:*", collection.as_str());
        let keys = self.redis.scan_keys(&pattern).await?;

        let mut docs = Vec::with_capacity(keys.len());
        for chunk in Self::mget_batches(&keys) {
            for raw in self.redis.mget(chunk).await? {
                // Keys deleted between SCAN and MGET come back empty.
                if let Some(doc) = Self::parse(raw)? {
                    docs.push(doc);
                }
            }
        }
        Ok(docs)
    }

    async fn create_if_absent(
        &self,
        collection: Collection,
        key: &str,
        doc: Value,
    ) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(&doc)?;
        Ok(self.redis.set_nx(&Self::key(collection, key), &payload).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(self.redis.ping().await?)
    }
}
