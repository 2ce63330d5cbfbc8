//! Wellness Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Proptest generators for client records and events
//! - Fixtures for common scenarios
//! - Store wrappers that inject failures
//! - Assertions over the derived stores

pub use wellness_core::{
    ClientEvent, ClientEventKind, ClientId, ClientRecord, NewClient, SearchDocument, StorageError,
    StoreKind, Timestamp, WellnessError, WellnessResult,
};
pub use wellness_storage::{
    CacheStore, ClientRepository, InMemoryCache, InMemoryClientRepository, InMemorySearchIndex,
    SearchIndex,
};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for client types.

    use super::*;
    use proptest::prelude::*;

    /// Client identities from a small range so that generated sequences hit
    /// the same identity repeatedly.
    pub fn arb_client_id() -> impl Strategy<Value = ClientId> {
        1u64..=8
    }

    /// Generate a Timestamp (DateTime<Utc>).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-2030
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_full_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{1,12}( [A-Z][a-z]{1,12})?"
    }

    pub fn arb_phone() -> impl Strategy<Value = String> {
        "\\+[1-9][0-9]{9,13}"
    }

    fn arb_word() -> impl Strategy<Value = String> {
        "[a-z]{0,10}"
    }

    /// Email unique to `id`, so records for distinct identities never
    /// collide on the uniqueness constraint.
    pub fn arb_email_for(id: ClientId) -> impl Strategy<Value = String> {
        ("[a-z]{1,8}", prop_oneof![Just("example.com"), Just("mail.org"), Just("clinic.net")])
            .prop_map(move |(local, domain)| format!("{}{}@{}", local, id, domain))
    }

    /// Generate a valid draft.
    pub fn arb_new_client() -> impl Strategy<Value = NewClient> {
        (arb_client_id(), arb_full_name(), arb_phone())
            .prop_flat_map(|(id, name, phone)| {
                (
                    Just(name),
                    arb_email_for(id),
                    Just(phone),
                    arb_word(),
                    arb_word(),
                    prop::option::of(1u64..100),
                    0u32..100,
                )
            })
            .prop_map(|(full_name, email, phone, occupation, reason, specialist_id, age)| NewClient {
                full_name,
                email,
                phone,
                occupation,
                reason_for_visit: reason,
                specialist_id,
                age,
                ..NewClient::default()
            })
    }

    /// Generate a full snapshot for `id`.
    pub fn arb_client_record_for(id: ClientId) -> impl Strategy<Value = ClientRecord> {
        (
            arb_full_name(),
            arb_email_for(id),
            arb_phone(),
            arb_word(),
            arb_word(),
            0u32..100,
            arb_timestamp(),
        )
            .prop_map(move |(full_name, email, phone, occupation, meeting_place, age, at)| {
                ClientRecord {
                    id,
                    full_name,
                    email,
                    phone,
                    advertising_channel: String::new(),
                    specialist_id: None,
                    meeting_place,
                    occupation,
                    gender: String::new(),
                    age,
                    reason_for_visit: String::new(),
                    specialist_notes: String::new(),
                    created_at: Some(at),
                    updated_at: Some(at),
                }
            })
    }

    pub fn arb_client_record() -> impl Strategy<Value = ClientRecord> {
        arb_client_id().prop_flat_map(arb_client_record_for)
    }

    pub fn arb_event_kind() -> impl Strategy<Value = ClientEventKind> {
        prop_oneof![
            Just(ClientEventKind::Created),
            Just(ClientEventKind::Updated),
            Just(ClientEventKind::Deleted),
        ]
    }

    /// Generate a decodable event.
    pub fn arb_client_event() -> impl Strategy<Value = ClientEvent> {
        (arb_event_kind(), arb_client_record())
            .prop_map(|(kind, snapshot)| ClientEvent::new(kind, snapshot))
    }

    /// Generate an event stream over a handful of identities.
    pub fn arb_event_sequence(max_len: usize) -> impl Strategy<Value = Vec<ClientEvent>> {
        prop::collection::vec(arb_client_event(), 1..=max_len)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records for common scenarios.

    use super::*;

    /// A valid client with a deterministic, identity-unique email.
    pub fn sample_client(id: ClientId) -> ClientRecord {
        let now = Utc::now();
        ClientRecord::from_draft(id, &sample_new_client(id), now)
    }

    /// A valid draft whose email is unique to `n`.
    pub fn sample_new_client(n: u64) -> NewClient {
        NewClient {
            occupation: "engineer".to_string(),
            reason_for_visit: "stress".to_string(),
            age: 30,
            ..NewClient::new(
                format!("Client {}", n),
                format!("client{}@example.com", n),
                format!("+1555000{:04}", n % 10_000),
            )
        }
    }
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

pub mod faults {
    //! Store wrappers that fail on demand.

    use super::*;

    fn unavailable(store: StoreKind, reason: &str) -> WellnessError {
        StorageError::Unavailable {
            store,
            reason: reason.to_string(),
        }
        .into()
    }

    /// Search index that fails writes for selected identities and delegates
    /// everything else.
    #[derive(Debug, Clone)]
    pub struct FailingSearchIndex<S> {
        inner: S,
        failing: Arc<BTreeSet<ClientId>>,
    }

    impl<S> FailingSearchIndex<S> {
        pub fn new(inner: S, failing: impl IntoIterator<Item = ClientId>) -> Self {
            Self {
                inner,
                failing: Arc::new(failing.into_iter().collect()),
            }
        }

        fn check(&self, id: ClientId) -> WellnessResult<()> {
            if self.failing.contains(&id) {
                return Err(unavailable(StoreKind::SearchIndex, "injected search failure"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl<S: SearchIndex> SearchIndex for FailingSearchIndex<S> {
        async fn index(&self, id: ClientId, doc: &SearchDocument) -> WellnessResult<()> {
            self.check(id)?;
            self.inner.index(id, doc).await
        }

        async fn get(&self, id: ClientId) -> WellnessResult<Option<SearchDocument>> {
            self.inner.get(id).await
        }

        async fn search(&self, query: &str) -> WellnessResult<Vec<SearchDocument>> {
            self.inner.search(query).await
        }

        async fn remove(&self, id: ClientId) -> WellnessResult<bool> {
            self.check(id)?;
            self.inner.remove(id).await
        }

        async fn ping(&self) -> WellnessResult<()> {
            self.inner.ping().await
        }
    }

    /// Cache that is always unreachable.
    #[derive(Debug, Clone, Default)]
    pub struct FailingCache;

    impl FailingCache {
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl CacheStore for FailingCache {
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> WellnessResult<()> {
            Err(unavailable(StoreKind::Cache, "injected cache failure"))
        }

        async fn get(&self, _key: &str) -> WellnessResult<Option<String>> {
            Err(unavailable(StoreKind::Cache, "injected cache failure"))
        }

        async fn delete(&self, _key: &str) -> WellnessResult<()> {
            Err(unavailable(StoreKind::Cache, "injected cache failure"))
        }

        async fn ping(&self) -> WellnessResult<()> {
            Err(unavailable(StoreKind::Cache, "injected cache failure"))
        }
    }

    /// Cache whose next `n` operations fail, then recovers.
    #[derive(Debug, Clone)]
    pub struct FlakyCache<C> {
        inner: C,
        remaining_failures: Arc<AtomicU32>,
    }

    impl<C> FlakyCache<C> {
        pub fn new(inner: C, failures: u32) -> Self {
            Self {
                inner,
                remaining_failures: Arc::new(AtomicU32::new(failures)),
            }
        }

        fn check(&self) -> WellnessResult<()> {
            let failed = self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(unavailable(StoreKind::Cache, "injected transient cache failure"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl<C: CacheStore> CacheStore for FlakyCache<C> {
        async fn set(&self, key: &str, value: &str, ttl: Duration) -> WellnessResult<()> {
            self.check()?;
            self.inner.set(key, value, ttl).await
        }

        async fn get(&self, key: &str) -> WellnessResult<Option<String>> {
            self.check()?;
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> WellnessResult<()> {
            self.check()?;
            self.inner.delete(key).await
        }

        async fn ping(&self) -> WellnessResult<()> {
            self.check()?;
            self.inner.ping().await
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over the derived stores.

    use super::*;
    use wellness_storage::cached_client;

    /// Cache and index both hold exactly `record`.
    #[track_caller]
    pub fn assert_derived_matches(
        cached: &Option<ClientRecord>,
        indexed: &Option<SearchDocument>,
        record: &ClientRecord,
    ) {
        assert_eq!(cached.as_ref(), Some(record), "cache does not hold the snapshot");
        assert_eq!(
            indexed.as_ref(),
            Some(&SearchDocument::from(record)),
            "search index does not hold the snapshot"
        );
    }

    /// Read the cached record and the indexed document of `id`.
    pub async fn derived_state(
        cache: &dyn CacheStore,
        search: &dyn SearchIndex,
        id: ClientId,
    ) -> WellnessResult<(Option<ClientRecord>, Option<SearchDocument>)> {
        let cached = cached_client(cache, id).await?;
        let indexed = search.get(id).await?;
        Ok((cached, indexed))
    }
}
