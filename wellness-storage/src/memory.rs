//! In-memory store implementations for tests and local runs.
//!
//! Each store wraps its state in an `Arc<RwLock<..>>`, so clones share data.
//! The repository enforces the same uniqueness rules as the Postgres schema,
//! including the case-sensitive email constraint and the refusal to
//! re-insert a deleted identity.

use crate::{CacheStore, ClientRepository, SearchIndex};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use wellness_core::{
    ClientId, ClientRecord, NewClient, SearchDocument, StorageError, StoreKind, WellnessResult,
};

// ============================================================================
// SYSTEM OF RECORD
// ============================================================================

#[derive(Debug, Default)]
struct RepositoryState {
    rows: BTreeMap<ClientId, ClientRecord>,
    deleted: BTreeSet<ClientId>,
    last_id: ClientId,
}

impl RepositoryState {
    fn email_owner(&self, email: &str) -> Option<ClientId> {
        self.rows
            .values()
            .find(|row| row.email == email)
            .map(|row| row.id)
    }
}

/// Repository backed by an ordered map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClientRepository {
    state: Arc<RwLock<RepositoryState>>,
}

impl InMemoryClientRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.rows.is_empty()
    }

    /// Snapshot of every row, ordered by id.
    pub async fn all(&self) -> Vec<ClientRecord> {
        self.state.read().await.rows.values().cloned().collect()
    }
}

fn email_conflict(id: ClientId, email: &str) -> StorageError {
    StorageError::Conflict {
        store: StoreKind::SystemOfRecord,
        id,
        reason: format!("email {} already registered", email),
    }
}

fn deleted_conflict(id: ClientId) -> StorageError {
    StorageError::Conflict {
        store: StoreKind::SystemOfRecord,
        id,
        reason: format!("client {} was deleted", id),
    }
}

#[async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn create(&self, draft: &NewClient) -> WellnessResult<ClientRecord> {
        let mut state = self.state.write().await;
        let id = state.last_id + 1;
        if state.email_owner(&draft.email).is_some() {
            return Err(email_conflict(id, &draft.email).into());
        }
        let record = ClientRecord::from_draft(id, draft, Utc::now());
        state.rows.insert(id, record.clone());
        state.last_id = id;
        Ok(record)
    }

    async fn insert(&self, record: &ClientRecord) -> WellnessResult<()> {
        let mut state = self.state.write().await;
        if state.deleted.contains(&record.id) {
            return Err(deleted_conflict(record.id).into());
        }
        if state.rows.contains_key(&record.id) {
            return Err(StorageError::Conflict {
                store: StoreKind::SystemOfRecord,
                id: record.id,
                reason: "duplicate id".to_string(),
            }
            .into());
        }
        if state.email_owner(&record.email).is_some() {
            return Err(email_conflict(record.id, &record.email).into());
        }
        state.rows.insert(record.id, record.clone());
        state.last_id = state.last_id.max(record.id);
        Ok(())
    }

    async fn get(&self, id: ClientId) -> WellnessResult<Option<ClientRecord>> {
        Ok(self.state.read().await.rows.get(&id).cloned())
    }

    async fn update(&self, record: &ClientRecord) -> WellnessResult<ClientRecord> {
        let mut state = self.state.write().await;
        if !state.rows.contains_key(&record.id) {
            return Err(StorageError::NotFound {
                store: StoreKind::SystemOfRecord,
                id: record.id,
            }
            .into());
        }
        if let Some(owner) = state.email_owner(&record.email) {
            if owner != record.id {
                return Err(email_conflict(record.id, &record.email).into());
            }
        }
        state.rows.insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn delete(&self, id: ClientId) -> WellnessResult<ClientRecord> {
        let mut state = self.state.write().await;
        let record = state.rows.remove(&id).ok_or(StorageError::NotFound {
            store: StoreKind::SystemOfRecord,
            id,
        })?;
        state.deleted.insert(id);
        Ok(record)
    }

    async fn ping(&self) -> WellnessResult<()> {
        Ok(())
    }
}

// ============================================================================
// CACHE
// ============================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    ttl: Duration,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        !self.ttl.is_zero() && self.stored_at.elapsed() >= self.ttl
    }
}

/// Cache with lazy expiry on `tokio::time::Instant`, so paused-clock tests
/// can advance past a TTL.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// TTL the live entry under `key` was written with.
    pub async fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.ttl)
    }

    /// Raw stored value, including tombstones.
    pub async fn raw(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> WellnessResult<()> {
        self.entries.write().await.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                ttl,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> WellnessResult<Option<String>> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) if entry.value.is_empty() => Ok(None),
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> WellnessResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> WellnessResult<()> {
        Ok(())
    }
}

// ============================================================================
// SEARCH INDEX
// ============================================================================

/// Index that scans every document with [`SearchDocument::matches`].
#[derive(Debug, Clone, Default)]
pub struct InMemorySearchIndex {
    docs: Arc<RwLock<BTreeMap<ClientId, SearchDocument>>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn index(&self, id: ClientId, doc: &SearchDocument) -> WellnessResult<()> {
        let mut doc = doc.clone();
        doc.id = id;
        self.docs.write().await.insert(id, doc);
        Ok(())
    }

    async fn get(&self, id: ClientId) -> WellnessResult<Option<SearchDocument>> {
        Ok(self.docs.read().await.get(&id).cloned())
    }

    async fn search(&self, query: &str) -> WellnessResult<Vec<SearchDocument>> {
        Ok(self
            .docs
            .read()
            .await
            .values()
            .filter(|doc| doc.matches(query))
            .cloned()
            .collect())
    }

    async fn remove(&self, id: ClientId) -> WellnessResult<bool> {
        Ok(self.docs.write().await.remove(&id).is_some())
    }

    async fn ping(&self) -> WellnessResult<()> {
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
