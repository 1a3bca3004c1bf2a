//! Shared L2 cache backed by Redis.
//!
//! L2 is authoritative whenever it answers; entries carry a wall-clock
//! TTL. Values cross the serialization boundary here: callers hand the
//! cache typed values and the cache owns the JSON encoding.

use crate::{Cache, CacheError, CacheResult, CachedValue};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for the Redis cache layer.
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// Full connection URL (`redis://[user:password@]host:port/db`).
    /// When empty, the individual fields below are used instead.
    pub url: String,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,
    /// Per-entry TTL in wall time. Strictly longer than the L1 TTL.
    pub ttl: Duration,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
            ttl: Duration::from_secs(300),
        }
    }
}

impl RedisCacheConfig {
    /// Resolve the connection URL, preferring the explicit `url` field.
    pub fn connection_url(&self) -> String {
        if !self.url.is_empty() {
            return self.url.clone();
        }
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.db
            )
        }
    }
}

/// L2: shared Redis cache with per-entry TTL.
///
/// The connection manager multiplexes one connection and reconnects
/// transparently; clones share it and are safe for concurrent use.
pub struct RedisCache {
    client: redis::Client,
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisCache {
    /// Connect to Redis and verify the connection with a ping.
    pub async fn connect(config: RedisCacheConfig) -> CacheResult<Self> {
        let url = config.connection_url();
        let client =
            redis::Client::open(url.as_str()).map_err(|e| CacheError::Backend(e.to_string()))?;
        let mut conn = ConnectionManager::new(client.clone()).await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(host = %config.host, port = config.port, "connected to redis");

        Ok(Self {
            client,
            conn,
            ttl: config.ttl,
        })
    }

    /// The underlying client, for pub/sub subscriptions.
    pub fn client(&self) -> redis::Client {
        self.client.clone()
    }
}

#[async_trait::async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<CachedValue> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(key).await?;
        let data = data.ok_or(CacheError::Miss)?;

        let value: CachedValue = serde_json::from_str(&data)?;
        debug!(key, "cache hit");
        Ok(value)
    }

    async fn set(&self, key: &str, value: CachedValue) -> CacheResult<()> {
        let data = serde_json::to_string(&value)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, data, self.ttl.as_secs()).await?;
        debug!(key, ttl_s = self.ttl.as_secs(), "cache set");
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys.to_vec()).await?;
        debug!(?keys, "cache delete");
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = {
            let mut iter = conn.scan_match::<_, String>(pattern).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        if !keys.is_empty() {
            let deleted = keys.len();
            let _: () = conn.del(keys).await?;
            debug!(pattern, deleted, "cache delete pattern");
        }
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) -> CacheResult<()> {
        // The multiplexed connection closes when the last clone drops.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_url_prefers_explicit_url() {
        let config = RedisCacheConfig {
            url: "redis://example:6380/2".to_string(),
            ..Default::default()
        };
        assert_eq!(config.connection_url(), "redis://example:6380/2");
    }

    #[test]
    fn connection_url_from_parts() {
        let config = RedisCacheConfig::default();
        assert_eq!(config.connection_url(), "redis://localhost:6379/0");

        let with_password = RedisCacheConfig {
            password: "s3cret".to_string(),
            ..Default::default()
        };
        assert_eq!(
            with_password.connection_url(),
            "redis://:s3cret@localhost:6379/0"
        );
    }
}
