use redis::aio::{Connection, ConnectionManager};
use redis::AsyncCommands;

/// Thin wrapper over a multiplexed Redis connection.
///
/// Commands that depend on per-connection state (`WATCH`/`MULTI`/`EXEC`) must
/// run on [`RedisClient::dedicated_connection`] instead of the shared manager.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisClient {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!("connected to Redis");
        Ok(Self { client, conn })
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.set(key, value).await
    }

    /// `SET key value NX`; returns true when the key was created.
    pub async fn set_nx(&self, key: &str, value: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        let created: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(created.is_some())
    }

    pub async fn del(&self, key: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.del(key).await
    }

    pub async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, redis::RedisError> {
        if keys.is_empty() {
            return Ok(vec![]);
        }
        let mut conn = self.conn.clone();
        redis::cmd("MGET").arg(keys).query_async(&mut conn).await
    }

    /// Collect every key matching `pattern` with incremental `SCAN`.
    pub async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        let mut iter: redis::AsyncIter<String> = conn.scan_match(pattern).await?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    /// A fresh, unshared connection for optimistic transactions.
    pub async fn dedicated_connection(&self) -> Result<Connection, redis::RedisError> {
        #[allow(deprecated)]
        self.client.get_async_connection().await
    }
}
