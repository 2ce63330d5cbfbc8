//! Property-Based Tests for Derived Store Reconciliation
//!
//! **Idempotence**: applying any event twice leaves the stores exactly as
//! applying it once.
//!
//! **Order tolerance**: any sequence of well-formed events, in any order, is
//! handled without error and without stalling the consumer.
//!
//! **Deletion completeness**: after a Deleted event for an identity, neither
//! the cache nor the search index returns it.
//!
//! **Duplicate delivery**: redelivering every message right after itself
//! converges to the same state as delivering each once.
//!
//! **Last write wins**: when the last event for an identity is an Updated,
//! the cache and the index hold exactly its snapshot.

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use wellness_core::{ClientEvent, ClientId, ClientRecord, SearchDocument, SyncConfig, WellnessError};
use wellness_events::{EventBroker, InMemoryBroker};
use wellness_storage::{
    ClientRepository, InMemoryCache, InMemoryClientRepository, InMemorySearchIndex, SearchIndex,
};
use wellness_sync::{ConsumerMetrics, EventConsumer, Poll, ReconciliationHandlers};
use wellness_test_utils::assertions::{assert_derived_matches, derived_state};
use wellness_test_utils::generators::{arb_client_event, arb_event_sequence};

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn fail(e: WellnessError) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

/// Every identity the generators produce.
const IDS: std::ops::RangeInclusive<ClientId> = 1..=8;

type DerivedState = BTreeMap<ClientId, (Option<ClientRecord>, Option<SearchDocument>)>;

struct Harness {
    repo: InMemoryClientRepository,
    cache: InMemoryCache,
    search: InMemorySearchIndex,
    handlers: ReconciliationHandlers,
}

impl Harness {
    fn new() -> Self {
        let repo = InMemoryClientRepository::new();
        let cache = InMemoryCache::new();
        let search = InMemorySearchIndex::new();
        let handlers = ReconciliationHandlers::new(
            Arc::new(repo.clone()),
            Arc::new(cache.clone()),
            Arc::new(search.clone()),
        );
        Self {
            repo,
            cache,
            search,
            handlers,
        }
    }

    async fn apply_all(&self, events: &[ClientEvent]) -> Result<(), TestCaseError> {
        for event in events {
            self.handlers.dispatch(event).await.map_err(fail)?;
        }
        Ok(())
    }

    async fn derived(&self) -> Result<DerivedState, TestCaseError> {
        let mut state = BTreeMap::new();
        for id in IDS {
            let entry = derived_state(&self.cache, &self.search, id)
                .await
                .map_err(fail)?;
            state.insert(id, entry);
        }
        Ok(state)
    }

    async fn rows(&self) -> Vec<ClientRecord> {
        self.repo.all().await
    }
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Applying an event twice equals applying it once, from any prior state.
    #[test]
    fn prop_handlers_are_idempotent(
        history in arb_event_sequence(12),
        event in arb_client_event(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let once = Harness::new();
            once.apply_all(&history).await?;
            once.apply_all(std::slice::from_ref(&event)).await?;

            let twice = Harness::new();
            twice.apply_all(&history).await?;
            twice.apply_all(&[event.clone(), event.clone()]).await?;

            prop_assert_eq!(once.derived().await?, twice.derived().await?);
            prop_assert_eq!(once.rows().await, twice.rows().await);
            Ok(())
        })?;
    }

    /// Any ordering of well-formed events is consumed without a handler
    /// failure, and every cursor is committed.
    #[test]
    fn prop_consumer_tolerates_any_order(events in arb_event_sequence(20)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let harness = Harness::new();
            let broker = InMemoryBroker::new("client_events", 1);
            for event in &events {
                let payload = event.encode().map_err(|e| TestCaseError::fail(e.to_string()))?;
                broker
                    .append_to(0, &event.client_id().unwrap_or_default().to_string(), &payload)
                    .await
                    .map_err(fail)?;
            }

            let config = SyncConfig {
                poll_wait: Duration::from_millis(10),
                ..SyncConfig::default()
            };
            let metrics = Arc::new(ConsumerMetrics::new());
            let consumer = EventConsumer::new(
                Arc::new(broker.clone()) as Arc<dyn EventBroker>,
                harness.handlers.clone(),
                &config,
                0,
                metrics.clone(),
            );

            for _ in &events {
                let poll = consumer.poll_once().await;
                prop_assert!(matches!(poll, Poll::Handled(_)), "unexpected poll result {:?}", poll);
            }
            prop_assert_eq!(consumer.poll_once().await, Poll::Idle);

            let snapshot = metrics.snapshot();
            prop_assert_eq!(snapshot.handler_failures, 0);
            prop_assert_eq!(snapshot.committed, events.len() as u64);
            prop_assert_eq!(
                broker.committed(&config.consumer_group, 0).await,
                Some(events.len() as u64)
            );
            Ok(())
        })?;
    }

    /// After a Deleted event, cache and index no longer return the identity.
    #[test]
    fn prop_deletion_is_complete(
        history in arb_event_sequence(12),
        target in arb_client_event(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let harness = Harness::new();
            harness.apply_all(&history).await?;

            let id = target.client_id().unwrap_or_default();
            let deleted = match target {
                ClientEvent::Created(s) | ClientEvent::Updated(s) | ClientEvent::Deleted(s) => {
                    ClientEvent::Deleted(s)
                }
                other => other,
            };
            harness.apply_all(&[deleted]).await?;

            let (cached, indexed) = derived_state(&harness.cache, &harness.search, id)
                .await
                .map_err(fail)?;
            prop_assert!(cached.is_none());
            prop_assert!(indexed.is_none());
            prop_assert!(harness.search.search(&id.to_string()).await.map_err(fail)?
                .iter()
                .all(|doc| doc.id != id));
            Ok(())
        })?;
    }

    /// Delivering every message twice in a row ends in the same state as
    /// delivering it once.
    #[test]
    fn prop_duplicate_delivery_converges(events in arb_event_sequence(16)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let single = Harness::new();
            single.apply_all(&events).await?;

            let doubled: Vec<ClientEvent> = events
                .iter()
                .flat_map(|event| [event.clone(), event.clone()])
                .collect();
            let duplicated = Harness::new();
            duplicated.apply_all(&doubled).await?;

            prop_assert_eq!(single.derived().await?, duplicated.derived().await?);
            prop_assert_eq!(single.rows().await, duplicated.rows().await);
            Ok(())
        })?;
    }

    /// The last Updated snapshot of an identity is what cache and index hold.
    #[test]
    fn prop_last_update_wins(events in arb_event_sequence(16)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let harness = Harness::new();
            harness.apply_all(&events).await?;

            let mut last: BTreeMap<ClientId, &ClientEvent> = BTreeMap::new();
            for event in &events {
                if let Some(id) = event.client_id() {
                    last.insert(id, event);
                }
            }

            for (id, event) in last {
                if let ClientEvent::Updated(snapshot) = event {
                    let (cached, indexed) = derived_state(&harness.cache, &harness.search, id)
                        .await
                        .map_err(fail)?;
                    assert_derived_matches(&cached, &indexed, snapshot);
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}

#[test]
fn test_repository_untouched_by_deleted_events() {
    let rt = Runtime::new().expect("runtime should build");
    rt.block_on(async {
        let harness = Harness::new();
        let snapshot = wellness_test_utils::fixtures::sample_client(1);
        harness
            .apply_all(&[
                ClientEvent::Created(snapshot.clone()),
                ClientEvent::Deleted(snapshot.clone()),
            ])
            .await
            .expect("events should apply");

        assert_eq!(
            harness.repo.get(1).await.expect("get should succeed"),
            Some(snapshot)
        );
    });
}
