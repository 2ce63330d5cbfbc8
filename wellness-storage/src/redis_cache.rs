//! Redis-backed cache store.

use crate::CacheStore;
use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use wellness_core::{
    ConfigError, StorageError, StoreKind, WellnessError, WellnessResult, DEFAULT_CACHE_TIMEOUT_MS,
};

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: usize,
    /// Per-operation timeout
    pub timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 16,
            timeout: Duration::from_millis(DEFAULT_CACHE_TIMEOUT_MS),
        }
    }
}

impl RedisConfig {
    /// Environment variables: `WELLNESS_REDIS_URL`, `WELLNESS_REDIS_POOL_SIZE`,
    /// `WELLNESS_REDIS_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("WELLNESS_REDIS_URL").unwrap_or(defaults.url),
            pool_size: std::env::var("WELLNESS_REDIS_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pool_size),
            timeout: std::env::var("WELLNESS_REDIS_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn create_pool(&self) -> WellnessResult<Pool> {
        let mut cfg = Config::from_url(&self.url);
        cfg.pool = Some(PoolConfig::new(self.pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ConfigError::InvalidValue {
                field: "WELLNESS_REDIS_URL".to_string(),
                value: self.url.clone(),
                reason: e.to_string(),
            })?;
        Ok(pool)
    }
}

/// Cache store over a deadpool-redis pool.
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
    timeout: Duration,
}

fn unavailable(reason: impl Into<String>) -> WellnessError {
    StorageError::Unavailable {
        store: StoreKind::Cache,
        reason: reason.into(),
    }
    .into()
}

fn redis_error(err: redis::RedisError) -> WellnessError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        unavailable(err.to_string())
    } else {
        StorageError::OperationFailed {
            store: StoreKind::Cache,
            reason: err.to_string(),
        }
        .into()
    }
}

impl RedisCache {
    pub fn new(pool: Pool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn conn(&self) -> WellnessResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| unavailable(format!("Failed to get Redis connection: {}", e)))
    }

    async fn timed<T, F>(&self, op: &str, fut: F) -> WellnessResult<T>
    where
        F: Future<Output = WellnessResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(unavailable(format!(
                "{} timed out after {}ms",
                op,
                self.timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> WellnessResult<()> {
        self.timed("SET", async {
            let mut conn = self.conn().await?;
            let written = if ttl.is_zero() {
                conn.set::<_, _, ()>(key, value).await
            } else {
                conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                    .await
            };
            written.map_err(redis_error)?;
            tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set");
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> WellnessResult<Option<String>> {
        self.timed("GET", async {
            let mut conn = self.conn().await?;
            let value = conn
                .get::<_, Option<String>>(key)
                .await
                .map_err(redis_error)?;
            Ok(value.filter(|v| !v.is_empty()))
        })
        .await
    }

    async fn delete(&self, key: &str) -> WellnessResult<()> {
        self.timed("DEL", async {
            let mut conn = self.conn().await?;
            conn.del::<_, ()>(key).await.map_err(redis_error)
        })
        .await
    }

    async fn ping(&self) -> WellnessResult<()> {
        self.timed("PING", async {
            let mut conn = self.conn().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(redis_error)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_defaults() {
        let config = RedisConfig::default();
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.timeout, Duration::from_millis(2_000));
    }

    #[test]
    fn test_create_pool_rejects_bad_url() {
        let config = RedisConfig {
            url: "not a url".to_string(),
            ..RedisConfig::default()
        };
        let err = config.create_pool().expect_err("bad url should fail");
        assert!(matches!(err, WellnessError::Config(_)));
    }

    #[test]
    fn test_redis_error_classification() {
        let io = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(redis_error(io).is_transient());

        let typed = redis::RedisError::from((redis::ErrorKind::TypeError, "wrong type"));
        assert!(!redis_error(typed).is_transient());
    }
}
