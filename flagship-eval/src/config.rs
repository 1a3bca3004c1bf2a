//! Environment-driven configuration.
//!
//! Every knob has a default suitable for local development; deployments
//! override through environment variables.

use flagship_cache::{MemoryCacheConfig, RedisCacheConfig};
use flagship_core::duration::parse_duration;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisCacheConfig,
    pub memory_cache: MemoryCacheConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
    pub max_conns: u32,
    pub min_conns: u32,
    pub max_conn_lifetime: Duration,
    pub max_conn_idle_time: Duration,
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// The L1 TTL is clamped below the L2 TTL so process-local staleness
    /// can never exceed the shared bound, even without invalidation.
    pub fn load() -> Self {
        let redis = RedisCacheConfig {
            url: env_string("REDIS_URL", ""),
            host: env_string("REDIS_HOST", "localhost"),
            port: env_u16("REDIS_PORT", 6379),
            password: env_string("REDIS_PASSWORD", ""),
            db: env_i64("REDIS_DB", 0),
            ttl: env_duration("REDIS_TTL", Duration::from_secs(300)),
        };

        let mut memory_cache = MemoryCacheConfig {
            max_size_bytes: env_u64("MEMORY_CACHE_MAX_SIZE", 100 * 1024 * 1024),
            ttl: env_duration("MEMORY_CACHE_TTL", Duration::from_secs(30)),
        };
        if memory_cache.ttl >= redis.ttl {
            let clamped = redis.ttl / 2;
            warn!(
                configured_ms = memory_cache.ttl.as_millis() as u64,
                clamped_ms = clamped.as_millis() as u64,
                "memory cache TTL must stay below the redis TTL; clamping"
            );
            memory_cache.ttl = clamped;
        }

        Self {
            server: ServerConfig {
                port: env_u16("PORT", 8081),
                shutdown_timeout: env_duration("SERVER_SHUTDOWN_TIMEOUT", Duration::from_secs(30)),
            },
            database: DatabaseConfig {
                host: env_string("DB_HOST", "localhost"),
                port: env_u16("DB_PORT", 5432),
                user: env_string("DB_USER", "postgres"),
                password: env_string("DB_PASSWORD", "postgres"),
                database: env_string("DB_NAME", "featureflags"),
                ssl_mode: env_string("DB_SSL_MODE", "disable"),
                max_conns: env_u32("DB_MAX_CONNS", 25),
                min_conns: env_u32("DB_MIN_CONNS", 5),
                max_conn_lifetime: env_duration("DB_MAX_CONN_LIFETIME", Duration::from_secs(3600)),
                max_conn_idle_time: env_duration(
                    "DB_MAX_CONN_IDLE_TIME",
                    Duration::from_secs(1800),
                ),
            },
            redis,
            memory_cache,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_duration(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_duration(&v).ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_includes_all_parts() {
        let db = DatabaseConfig {
            host: "db.internal".to_string(),
            port: 5433,
            user: "flags".to_string(),
            password: "pw".to_string(),
            database: "featureflags".to_string(),
            ssl_mode: "require".to_string(),
            max_conns: 25,
            min_conns: 5,
            max_conn_lifetime: Duration::from_secs(3600),
            max_conn_idle_time: Duration::from_secs(1800),
        };
        assert_eq!(
            db.connection_string(),
            "postgres://flags:pw@db.internal:5433/featureflags?sslmode=require"
        );
    }
}
