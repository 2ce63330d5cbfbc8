//! Wellness Storage - Store Contracts and Adapters
//!
//! Three contracts, one per store:
//! - [`ClientRepository`]: the authoritative system of record
//! - [`CacheStore`]: key-value mirror with TTL
//! - [`SearchIndex`]: full-text document mirror
//!
//! The cache and the index are derived projections. Nothing here couples
//! them transactionally to the system of record.

pub mod elasticsearch;
pub mod memory;
pub mod postgres;
pub mod redis_cache;

pub use elasticsearch::{ElasticsearchIndex, SearchConfig};
pub use memory::{InMemoryCache, InMemoryClientRepository, InMemorySearchIndex};
pub use postgres::{DbConfig, PgClientRepository};
pub use redis_cache::{RedisCache, RedisConfig};

use async_trait::async_trait;
use std::time::Duration;
use wellness_core::{
    cache_key, ClientId, ClientRecord, NewClient, SearchDocument, StorageError, StoreKind,
    WellnessResult, CACHE_TTL_SECS,
};

// ============================================================================
// SYSTEM OF RECORD
// ============================================================================

/// Authoritative store for client records.
///
/// Implementations must enforce uniqueness of both `id` and `email` and
/// report violations as [`StorageError::Conflict`]. An id that was deleted
/// is never accepted again, by `insert` or by `create`.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// Persist a new client under a freshly assigned identity.
    async fn create(&self, draft: &NewClient) -> WellnessResult<ClientRecord>;

    /// Persist a snapshot under its own identity.
    async fn insert(&self, record: &ClientRecord) -> WellnessResult<()>;

    async fn get(&self, id: ClientId) -> WellnessResult<Option<ClientRecord>>;

    /// Overwrite an existing row. Fails with `NotFound` when the id is absent.
    async fn update(&self, record: &ClientRecord) -> WellnessResult<ClientRecord>;

    /// Remove a row and return its last state.
    async fn delete(&self, id: ClientId) -> WellnessResult<ClientRecord>;

    async fn ping(&self) -> WellnessResult<()>;
}

// ============================================================================
// DERIVED STORES
// ============================================================================

/// Key-value cache.
///
/// A zero `ttl` stores the value without expiry. An empty value reads back
/// as absent, which is what makes `("", 0)` a tombstone.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> WellnessResult<()>;

    async fn get(&self, key: &str) -> WellnessResult<Option<String>>;

    async fn delete(&self, key: &str) -> WellnessResult<()>;

    async fn ping(&self) -> WellnessResult<()>;

    /// Mark a key deleted.
    async fn tombstone(&self, key: &str) -> WellnessResult<()> {
        self.set(key, "", Duration::ZERO).await
    }
}

/// Full-text index with one document per client.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create or replace the document for `id`.
    async fn index(&self, id: ClientId, doc: &SearchDocument) -> WellnessResult<()>;

    async fn get(&self, id: ClientId) -> WellnessResult<Option<SearchDocument>>;

    /// Free-text query across the document's text fields.
    async fn search(&self, query: &str) -> WellnessResult<Vec<SearchDocument>>;

    /// Remove the document. Returns whether one existed.
    async fn remove(&self, id: ClientId) -> WellnessResult<bool>;

    async fn ping(&self) -> WellnessResult<()>;
}

// ============================================================================
// CACHE HELPERS
// ============================================================================

/// Write a snapshot to the cache under `client:{id}` with the standard TTL.
pub async fn cache_client(cache: &dyn CacheStore, record: &ClientRecord) -> WellnessResult<()> {
    let value = serde_json::to_string(record).map_err(|e| StorageError::Serialization {
        store: StoreKind::Cache,
        reason: e.to_string(),
    })?;
    cache
        .set(
            &record.cache_key(),
            &value,
            Duration::from_secs(CACHE_TTL_SECS),
        )
        .await
}

/// Read a snapshot back from the cache.
pub async fn cached_client(
    cache: &dyn CacheStore,
    id: ClientId,
) -> WellnessResult<Option<ClientRecord>> {
    let Some(value) = cache.get(&cache_key(id)).await? else {
        return Ok(None);
    };
    let record = serde_json::from_str(&value).map_err(|e| StorageError::Serialization {
        store: StoreKind::Cache,
        reason: e.to_string(),
    })?;
    Ok(Some(record))
}
