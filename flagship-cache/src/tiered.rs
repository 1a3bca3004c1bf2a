//! Two-tier read-through facade.

use crate::{Cache, CacheError, CacheResult, CachedValue};
use std::sync::Arc;
use tracing::{debug, warn};

/// Composes a process-local L1 and a shared L2 behind the same
/// capability set.
///
/// L1 is a hot-path shortcut; L2 is authoritative whenever it answers. A
/// failed L1 operation never fails the caller: reads fall through to L2
/// and writes are logged and skipped. L2 failures surface, because shared
/// state is what the caller is paying for.
pub struct TieredCache {
    l1: Arc<dyn Cache>,
    l2: Arc<dyn Cache>,
}

impl TieredCache {
    pub fn new(l1: Arc<dyn Cache>, l2: Arc<dyn Cache>) -> Self {
        debug!("initialized tiered cache (L1: memory, L2: redis)");
        Self { l1, l2 }
    }
}

#[async_trait::async_trait]
impl Cache for TieredCache {
    /// Check L1, then L2. An L2 hit populates L1 best-effort.
    async fn get(&self, key: &str) -> CacheResult<CachedValue> {
        match self.l1.get(key).await {
            Ok(value) => return Ok(value),
            Err(CacheError::Miss) => {}
            Err(err) => warn!(key, error = %err, "L1 read failed, falling through"),
        }

        let value = self.l2.get(key).await?;

        if let Err(err) = self.l1.set(key, value.clone()).await {
            warn!(key, error = %err, "failed to populate L1 from L2");
        }

        Ok(value)
    }

    /// Write L1 first (non-fatal), then L2 (surfaced).
    async fn set(&self, key: &str, value: CachedValue) -> CacheResult<()> {
        if let Err(err) = self.l1.set(key, value.clone()).await {
            warn!(key, error = %err, "failed to set L1 cache");
        }

        self.l2.set(key, value).await
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<()> {
        if let Err(err) = self.l1.delete(keys).await {
            warn!(?keys, error = %err, "failed to delete from L1 cache");
        }

        self.l2.delete(keys).await
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<()> {
        if let Err(err) = self.l1.delete_pattern(pattern).await {
            warn!(pattern, error = %err, "failed to delete pattern from L1 cache");
        }

        self.l2.delete_pattern(pattern).await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.l2.ping().await
    }

    async fn close(&self) -> CacheResult<()> {
        if let Err(err) = self.l1.close().await {
            warn!(error = %err, "failed to close L1 cache");
        }
        self.l2.close().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flagship_core::FlagValue;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use uuid::Uuid;

    /// In-memory stub provider that records every operation.
    #[derive(Default)]
    pub(crate) struct StubCache {
        pub entries: Mutex<HashMap<String, CachedValue>>,
        pub deleted: Mutex<Vec<String>>,
        pub patterns: Mutex<Vec<String>>,
        pub fail_reads: bool,
    }

    impl StubCache {
        pub fn with_failing_reads() -> Self {
            Self {
                fail_reads: true,
                ..Default::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl Cache for StubCache {
        async fn get(&self, key: &str) -> CacheResult<CachedValue> {
            if self.fail_reads {
                return Err(CacheError::Backend("stub read failure".to_string()));
            }
            self.entries
                .lock()
                .get(key)
                .cloned()
                .ok_or(CacheError::Miss)
        }

        async fn set(&self, key: &str, value: CachedValue) -> CacheResult<()> {
            self.entries.lock().insert(key.to_string(), value);
            Ok(())
        }

        async fn delete(&self, keys: &[String]) -> CacheResult<()> {
            let mut entries = self.entries.lock();
            for key in keys {
                entries.remove(key);
                self.deleted.lock().push(key.clone());
            }
            Ok(())
        }

        async fn delete_pattern(&self, pattern: &str) -> CacheResult<()> {
            let prefix = pattern.trim_end_matches('*');
            self.entries.lock().retain(|k, _| !k.starts_with(prefix));
            self.patterns.lock().push(pattern.to_string());
            Ok(())
        }

        async fn ping(&self) -> CacheResult<()> {
            Ok(())
        }

        async fn close(&self) -> CacheResult<()> {
            Ok(())
        }
    }

    pub(crate) fn sample_value() -> CachedValue {
        CachedValue::FlagValue(FlagValue {
            id: Uuid::new_v4(),
            flag_id: Uuid::new_v4(),
            environment_id: Uuid::new_v4(),
            is_active: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        })
    }

    #[tokio::test]
    async fn l1_hit_short_circuits() {
        let l1 = Arc::new(StubCache::default());
        let l2 = Arc::new(StubCache::default());
        l1.set("k", sample_value()).await.unwrap();

        let tiered = TieredCache::new(l1, l2.clone());
        assert!(tiered.get("k").await.is_ok());
        assert!(l2.entries.lock().is_empty());
    }

    #[tokio::test]
    async fn l2_hit_populates_l1() {
        let l1 = Arc::new(StubCache::default());
        let l2 = Arc::new(StubCache::default());
        l2.set("k", sample_value()).await.unwrap();

        let tiered = TieredCache::new(l1.clone(), l2);
        assert!(tiered.get("k").await.is_ok());
        assert!(l1.entries.lock().contains_key("k"));
    }

    #[tokio::test]
    async fn miss_in_both_layers_surfaces_as_miss() {
        let tiered = TieredCache::new(
            Arc::new(StubCache::default()),
            Arc::new(StubCache::default()),
        );
        assert!(matches!(tiered.get("absent").await, Err(CacheError::Miss)));
    }

    #[tokio::test]
    async fn l1_read_failure_falls_through_to_l2() {
        let l1 = Arc::new(StubCache::with_failing_reads());
        let l2 = Arc::new(StubCache::default());
        l2.set("k", sample_value()).await.unwrap();

        let tiered = TieredCache::new(l1, l2);
        assert!(tiered.get("k").await.is_ok());
    }

    #[tokio::test]
    async fn set_writes_both_layers() {
        let l1 = Arc::new(StubCache::default());
        let l2 = Arc::new(StubCache::default());

        let tiered = TieredCache::new(l1.clone(), l2.clone());
        tiered.set("k", sample_value()).await.unwrap();

        assert!(l1.entries.lock().contains_key("k"));
        assert!(l2.entries.lock().contains_key("k"));
    }

    #[tokio::test]
    async fn delete_removes_from_both_layers() {
        let l1 = Arc::new(StubCache::default());
        let l2 = Arc::new(StubCache::default());
        l1.set("k", sample_value()).await.unwrap();
        l2.set("k", sample_value()).await.unwrap();

        let tiered = TieredCache::new(l1.clone(), l2.clone());
        tiered.delete(&["k".to_string()]).await.unwrap();

        assert!(l1.entries.lock().is_empty());
        assert!(l2.entries.lock().is_empty());
    }

    #[tokio::test]
    async fn pattern_delete_reaches_both_layers() {
        let l1 = Arc::new(StubCache::default());
        let l2 = Arc::new(StubCache::default());

        let tiered = TieredCache::new(l1.clone(), l2.clone());
        tiered.delete_pattern("variants:fv:*").await.unwrap();

        assert_eq!(l1.patterns.lock().as_slice(), ["variants:fv:*"]);
        assert_eq!(l2.patterns.lock().as_slice(), ["variants:fv:*"]);
    }
}
