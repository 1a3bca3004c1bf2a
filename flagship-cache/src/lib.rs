//! Tiered caching for the Flagship evaluation service.
//!
//! Two layers behind one capability set: an in-process L1 with
//! frequency-based admission and a shared Redis L2 with wall-clock TTLs.
//! The tiered facade composes any two providers, and an out-of-band
//! pub/sub subscriber translates admin invalidation events into key
//! removals.

pub mod keys;
pub mod memory;
pub mod redis_cache;
pub mod subscriber;
pub mod tiered;

pub use memory::{MemoryCache, MemoryCacheConfig};
pub use redis_cache::{RedisCache, RedisCacheConfig};
pub use subscriber::{InvalidationSubscriber, SubscriberState};
pub use tiered::TieredCache;

use flagship_core::{Environment, Flag, FlagValue, Variant};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Errors produced by cache providers.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The key is absent from this tier. Always recovered by falling
    /// through to the next tier or the persistent store.
    #[error("cache miss")]
    Miss,

    /// The cache backend failed (connection, protocol, ...)
    #[error("cache backend error: {0}")]
    Backend(String),

    /// A value could not cross the serialization boundary
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// A value admitted to the cache; one arm per cached value class.
///
/// Every arm owns its data outright, with no `Arc`/`Rc` inside: that is
/// what makes `Clone` a deep copy, and the deep copy is what keeps
/// admitted values un-aliased by callers. Keep it that way when adding
/// arms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum CachedValue {
    Environment(Environment),
    Flag(Flag),
    ActiveFlags(Vec<Flag>),
    FlagValue(FlagValue),
    FlagValueMap(HashMap<String, FlagValue>),
    Variants(Vec<Variant>),
}

impl CachedValue {
    /// Approximate in-memory cost in bytes, used by the L1 admission
    /// policy. Intentionally cheap: struct size plus owned string bytes,
    /// no serialization on the hot path.
    pub fn approx_cost(&self) -> u32 {
        fn flag_cost(f: &Flag) -> usize {
            std::mem::size_of::<Flag>()
                + f.key.len()
                + f.name.len()
                + f.description.as_ref().map_or(0, String::len)
                + f.default_value.len()
        }

        let bytes = match self {
            CachedValue::Environment(e) => {
                std::mem::size_of::<Environment>()
                    + e.key.len()
                    + e.name.len()
                    + e.description.as_ref().map_or(0, String::len)
                    + e.api_key.len()
            }
            CachedValue::Flag(f) => flag_cost(f),
            CachedValue::ActiveFlags(flags) => flags.iter().map(flag_cost).sum(),
            CachedValue::FlagValue(_) => std::mem::size_of::<FlagValue>(),
            CachedValue::FlagValueMap(map) => map
                .iter()
                .map(|(k, _)| k.len() + std::mem::size_of::<FlagValue>())
                .sum(),
            CachedValue::Variants(variants) => variants
                .iter()
                .map(|v| std::mem::size_of::<Variant>() + v.value.len())
                .sum(),
        };

        bytes.max(1).min(u32::MAX as usize) as u32
    }
}

/// The read-through capability set shared by both layers and the tiered
/// facade. Tests substitute in-memory stubs for either provider.
#[async_trait::async_trait]
pub trait Cache: Send + Sync {
    /// Look up a key. Absence is `CacheError::Miss`.
    async fn get(&self, key: &str) -> CacheResult<CachedValue>;

    /// Store a value under a key.
    async fn set(&self, key: &str, value: CachedValue) -> CacheResult<()>;

    /// Remove the given keys.
    async fn delete(&self, keys: &[String]) -> CacheResult<()>;

    /// Remove all keys matching a `prefix*` pattern.
    async fn delete_pattern(&self, pattern: &str) -> CacheResult<()>;

    /// Verify the backend is reachable.
    async fn ping(&self) -> CacheResult<()>;

    /// Release backend resources.
    async fn close(&self) -> CacheResult<()>;
}
