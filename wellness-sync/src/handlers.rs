//! Reconciliation handlers
//!
//! One handler per event type. Each is idempotent: applying the same event
//! twice leaves the stores exactly as applying it once.
//!
//! - Created: insert into the system of record unless the id is already
//!   there, then write through to the cache and the search index. When the
//!   row already exists the derived stores are refreshed from that row.
//!   Ids the system of record saw deleted stay deleted.
//! - Updated: overwrite the system of record row when it exists, and always
//!   overwrite the cache and the index (last write wins by arrival order).
//! - Deleted: tombstone the cache entry and remove the search document.

use std::sync::Arc;
use wellness_core::{cache_key, ClientEvent, ClientId, ClientRecord, SearchDocument, WellnessResult};
use wellness_storage::{cache_client, CacheStore, ClientRepository, SearchIndex};

/// What a handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The snapshot was applied.
    Applied,
    /// Created for an identity that already exists or was deleted. The system
    /// of record was left alone; the derived stores were refreshed from its
    /// row when there is one.
    DuplicateNoop,
    /// The event referenced an identity missing from a store. Derived stores
    /// were still brought in line with the snapshot.
    StaleReference,
    /// Unknown event type.
    Ignored,
}

/// Applies client events to the derived stores.
#[derive(Clone)]
pub struct ReconciliationHandlers {
    repository: Arc<dyn ClientRepository>,
    cache: Arc<dyn CacheStore>,
    search: Arc<dyn SearchIndex>,
}

impl ReconciliationHandlers {
    pub fn new(
        repository: Arc<dyn ClientRepository>,
        cache: Arc<dyn CacheStore>,
        search: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            repository,
            cache,
            search,
        }
    }

    /// Route an event to its handler.
    pub async fn dispatch(&self, event: &ClientEvent) -> WellnessResult<Outcome> {
        match event {
            ClientEvent::Created(snapshot) => self.on_created(snapshot).await,
            ClientEvent::Updated(snapshot) => self.on_updated(snapshot).await,
            ClientEvent::Deleted(snapshot) => self.on_deleted(snapshot.id).await,
            ClientEvent::Unknown { event } => {
                tracing::warn!(event = %event, "Unknown client event type, ignoring");
                Ok(Outcome::Ignored)
            }
        }
    }

    pub async fn on_created(&self, snapshot: &ClientRecord) -> WellnessResult<Outcome> {
        if let Some(current) = self.repository.get(snapshot.id).await? {
            tracing::debug!(
                client_id = snapshot.id,
                "Client already exists, refreshing derived stores from the system of record"
            );
            self.write_through(&current).await?;
            return Ok(Outcome::DuplicateNoop);
        }

        // The existence check and the insert are not atomic. A concurrent
        // duplicate loses on the uniqueness constraint instead.
        match self.repository.insert(snapshot).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                tracing::debug!(
                    client_id = snapshot.id,
                    reason = %e,
                    "Create lost a uniqueness race, treating as duplicate"
                );
                if let Some(current) = self.repository.get(snapshot.id).await? {
                    self.write_through(&current).await?;
                }
                return Ok(Outcome::DuplicateNoop);
            }
            Err(e) => return Err(e),
        }

        self.write_through(snapshot).await?;
        tracing::info!(client_id = snapshot.id, "Processed client_created event");
        Ok(Outcome::Applied)
    }

    pub async fn on_updated(&self, snapshot: &ClientRecord) -> WellnessResult<Outcome> {
        let mut outcome = Outcome::Applied;
        match self.repository.update(snapshot).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(
                    client_id = snapshot.id,
                    "Update for a client the system of record does not have"
                );
                outcome = Outcome::StaleReference;
            }
            Err(e) => {
                tracing::warn!(
                    client_id = snapshot.id,
                    error = %e,
                    "System of record rejected update, refreshing derived stores anyway"
                );
            }
        }

        self.write_through(snapshot).await?;
        tracing::info!(client_id = snapshot.id, "Processed client_updated event");
        Ok(outcome)
    }

    pub async fn on_deleted(&self, id: ClientId) -> WellnessResult<Outcome> {
        let tombstoned = self.cache.tombstone(&cache_key(id)).await;
        let removed = self.search.remove(id).await;

        let existed = match (tombstoned, removed) {
            (Ok(()), Ok(existed)) => existed,
            (Err(e), Ok(_)) | (Ok(()), Err(e)) => return Err(e),
            (Err(cache_err), Err(search_err)) => {
                tracing::error!(client_id = id, error = %search_err, "Search index removal failed");
                return Err(cache_err);
            }
        };

        tracing::info!(client_id = id, "Processed client_deleted event");
        if existed {
            Ok(Outcome::Applied)
        } else {
            tracing::debug!(client_id = id, "Delete for a client the search index never had");
            Ok(Outcome::StaleReference)
        }
    }

    /// Overwrite cache and index with the snapshot. Both stores are always
    /// attempted; the first failure is returned.
    async fn write_through(&self, snapshot: &ClientRecord) -> WellnessResult<()> {
        let cached = cache_client(self.cache.as_ref(), snapshot).await;
        let indexed = self
            .search
            .index(snapshot.id, &SearchDocument::from(snapshot))
            .await;

        match (cached, indexed) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(cache_err), Err(search_err)) => {
                tracing::error!(
                    client_id = snapshot.id,
                    error = %search_err,
                    "Search index write failed"
                );
                Err(cache_err)
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
