//! In-process L1 cache.
//!
//! Built on moka's TinyLFU cache: sketch-based admission, sampled
//! eviction, approximate byte-cost capacity, and a per-entry TTL that is
//! kept strictly shorter than L2's so process-local staleness never
//! exceeds the shared bound.

use crate::{Cache, CacheError, CacheResult, CachedValue};
use std::time::Duration;
use tracing::debug;

/// Configuration for the in-process cache.
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Approximate capacity in bytes.
    pub max_size_bytes: u64,
    /// Per-entry TTL. Must stay below the L2 TTL; the service config
    /// clamps it at load time.
    pub ttl: Duration,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 100 * 1024 * 1024,
            ttl: Duration::from_secs(30),
        }
    }
}

/// L1: in-process, cost-bounded cache with frequency-based admission.
pub struct MemoryCache {
    cache: moka::sync::Cache<String, CachedValue>,
}

impl MemoryCache {
    pub fn new(config: MemoryCacheConfig) -> Self {
        let cache = moka::sync::Cache::builder()
            .max_capacity(config.max_size_bytes)
            .weigher(|_key: &String, value: &CachedValue| value.approx_cost())
            .time_to_live(config.ttl)
            .build();

        debug!(
            max_size_bytes = config.max_size_bytes,
            ttl_ms = config.ttl.as_millis() as u64,
            "initialized memory cache"
        );

        Self { cache }
    }
}

#[async_trait::async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<CachedValue> {
        // moka clones on read; arms own their data, so the caller gets an
        // independent deep copy and cannot mutate the admitted value.
        self.cache.get(key).ok_or(CacheError::Miss)
    }

    async fn set(&self, key: &str, value: CachedValue) -> CacheResult<()> {
        self.cache.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<()> {
        for key in keys {
            self.cache.invalidate(key);
        }
        Ok(())
    }

    /// The admission structure has no efficient prefix scan, so a pattern
    /// delete clears L1 wholesale. Blunt but bounded by the short TTL.
    async fn delete_pattern(&self, pattern: &str) -> CacheResult<()> {
        self.cache.invalidate_all();
        debug!(pattern, "cleared memory cache on pattern delete");
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }

    async fn close(&self) -> CacheResult<()> {
        self.cache.invalidate_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flagship_core::{Flag, FlagType};
    use uuid::Uuid;

    fn sample_flag(key: &str) -> Flag {
        Flag {
            id: Uuid::new_v4(),
            key: key.to_string(),
            name: key.to_string(),
            description: None,
            flag_type: FlagType::Boolean,
            default_value: "false".to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn get_after_set_returns_the_value() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        let flag = sample_flag("dark-mode");

        cache
            .set("flag:key:dark-mode", CachedValue::Flag(flag.clone()))
            .await
            .unwrap();

        match cache.get("flag:key:dark-mode").await.unwrap() {
            CachedValue::Flag(cached) => assert_eq!(cached, flag),
            other => panic!("unexpected cached value: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_key_is_a_miss() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        assert!(matches!(
            cache.get("flag:key:absent").await,
            Err(CacheError::Miss)
        ));
    }

    #[tokio::test]
    async fn returned_values_do_not_alias_the_cached_copy() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        cache
            .set("flag:key:dark-mode", CachedValue::Flag(sample_flag("dark-mode")))
            .await
            .unwrap();

        let mut first = match cache.get("flag:key:dark-mode").await.unwrap() {
            CachedValue::Flag(f) => f,
            other => panic!("unexpected cached value: {other:?}"),
        };
        first.default_value = "true".to_string();

        match cache.get("flag:key:dark-mode").await.unwrap() {
            CachedValue::Flag(second) => assert_eq!(second.default_value, "false"),
            other => panic!("unexpected cached value: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_removes_only_named_keys() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        cache
            .set("flag:key:a", CachedValue::Flag(sample_flag("a")))
            .await
            .unwrap();
        cache
            .set("flag:key:b", CachedValue::Flag(sample_flag("b")))
            .await
            .unwrap();

        cache.delete(&["flag:key:a".to_string()]).await.unwrap();

        assert!(cache.get("flag:key:a").await.is_err());
        assert!(cache.get("flag:key:b").await.is_ok());
    }

    #[tokio::test]
    async fn pattern_delete_clears_everything() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        cache
            .set("variants:fv:1", CachedValue::Variants(vec![]))
            .await
            .unwrap();
        cache
            .set("flag:key:a", CachedValue::Flag(sample_flag("a")))
            .await
            .unwrap();

        cache.delete_pattern("variants:fv:*").await.unwrap();

        assert!(cache.get("variants:fv:1").await.is_err());
        assert!(cache.get("flag:key:a").await.is_err());
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new(MemoryCacheConfig {
            max_size_bytes: 1024 * 1024,
            ttl: Duration::from_millis(50),
        });
        cache
            .set("flag:key:a", CachedValue::Flag(sample_flag("a")))
            .await
            .unwrap();
        assert!(cache.get("flag:key:a").await.is_ok());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(matches!(
            cache.get("flag:key:a").await,
            Err(CacheError::Miss)
        ));
    }
}
