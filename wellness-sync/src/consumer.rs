//! Event consumer
//!
//! One consumer owns one partition. It fetches a record, decodes it,
//! dispatches it to the reconciliation handlers and then commits the cursor,
//! whatever the handler returned. Messages are handled strictly one at a
//! time, so two handlers never race on the same derived-store key.
//!
//! Delivery is at-most-once: a handler failure is logged and counted, never
//! retried. A transport error on fetch is transient; the consumer backs off
//! and fetches again. If the broker reports the group gone, the consumer
//! joins it again before the next fetch. Shutdown is honoured between
//! fetches.

use crate::handlers::{Outcome, ReconciliationHandlers};
use crate::metrics::ConsumerMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use wellness_core::{ClientEvent, SyncConfig};
use wellness_events::{BrokerRecord, EventBroker};

/// Result of one fetch-dispatch-commit iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Nothing arrived within the poll wait.
    Idle,
    /// The event was handled.
    Handled(Outcome),
    /// The payload could not be decoded and was dropped.
    Malformed,
    /// The handler failed; the event was dropped.
    HandlerFailed,
    /// The fetch failed.
    TransportError,
    /// The broker no longer knows the consumer group.
    GroupLost,
}

/// Single-partition consumer.
pub struct EventConsumer {
    broker: Arc<dyn EventBroker>,
    handlers: ReconciliationHandlers,
    group: String,
    name: String,
    partition: u32,
    poll_wait: Duration,
    fetch_backoff: Duration,
    metrics: Arc<ConsumerMetrics>,
}

impl EventConsumer {
    pub fn new(
        broker: Arc<dyn EventBroker>,
        handlers: ReconciliationHandlers,
        config: &SyncConfig,
        partition: u32,
        metrics: Arc<ConsumerMetrics>,
    ) -> Self {
        Self {
            broker,
            handlers,
            group: config.consumer_group.clone(),
            name: format!("{}-{}", config.consumer_name, partition),
            partition,
            poll_wait: config.poll_wait,
            fetch_backoff: config.fetch_backoff,
            metrics,
        }
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }

    /// Join the consumer group on this partition. Transport errors are
    /// retried after the fetch backoff until shutdown is signalled; returns
    /// `false` if shutdown came first.
    pub async fn join(&self, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        loop {
            if stopping(shutdown_rx) {
                return false;
            }
            match self.broker.join(&self.group, self.partition).await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(
                        partition = self.partition,
                        group = %self.group,
                        error = %e,
                        "Failed to join consumer group, retrying"
                    );
                    if !self.backoff(shutdown_rx).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Run one iteration: fetch, decode, dispatch, commit.
    pub async fn poll_once(&self) -> Poll {
        let record = match self
            .broker
            .fetch(&self.group, &self.name, self.partition, self.poll_wait)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => return Poll::Idle,
            Err(e) => {
                ConsumerMetrics::incr(&self.metrics.fetch_errors);
                tracing::warn!(
                    partition = self.partition,
                    error = %e,
                    "Failed to fetch client event"
                );
                return if e.is_group_missing() {
                    Poll::GroupLost
                } else {
                    Poll::TransportError
                };
            }
        };
        ConsumerMetrics::incr(&self.metrics.received);

        let poll = self.handle(&record).await;
        self.commit(&record).await;
        poll
    }

    async fn handle(&self, record: &BrokerRecord) -> Poll {
        let event = match ClientEvent::decode(&record.payload) {
            Ok(event) => event,
            Err(e) => {
                ConsumerMetrics::incr(&self.metrics.malformed);
                tracing::warn!(
                    partition = record.partition,
                    cursor = %record.cursor,
                    key = %record.key,
                    error = %e,
                    "Dropping malformed client event"
                );
                return Poll::Malformed;
            }
        };

        match self.handlers.dispatch(&event).await {
            Ok(outcome) => {
                let counter = match outcome {
                    Outcome::Applied => &self.metrics.applied,
                    Outcome::DuplicateNoop => &self.metrics.duplicates,
                    Outcome::StaleReference => &self.metrics.stale_references,
                    Outcome::Ignored => &self.metrics.ignored,
                };
                ConsumerMetrics::incr(counter);
                Poll::Handled(outcome)
            }
            Err(e) => {
                ConsumerMetrics::incr(&self.metrics.handler_failures);
                tracing::error!(
                    partition = record.partition,
                    cursor = %record.cursor,
                    event_type = event.event_type(),
                    client_id = ?event.client_id(),
                    error = %e,
                    "Failed to process client event, dropping"
                );
                Poll::HandlerFailed
            }
        }
    }

    async fn commit(&self, record: &BrokerRecord) {
        match self.broker.commit(&self.group, record).await {
            Ok(()) => ConsumerMetrics::incr(&self.metrics.committed),
            Err(e) => {
                // The record may be delivered again after a rejoin; the
                // handlers are idempotent.
                ConsumerMetrics::incr(&self.metrics.commit_failures);
                tracing::warn!(
                    partition = record.partition,
                    cursor = %record.cursor,
                    error = %e,
                    "Failed to commit cursor"
                );
            }
        }
    }

    /// Consume until shutdown is signalled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        if !self.join(&mut shutdown_rx).await {
            return;
        }
        tracing::info!(
            partition = self.partition,
            group = %self.group,
            consumer = %self.name,
            topic = self.broker.topic(),
            "Event consumer started"
        );

        while !stopping(&shutdown_rx) {
            let resumed = match self.poll_once().await {
                Poll::TransportError => self.backoff(&mut shutdown_rx).await,
                Poll::GroupLost => {
                    tracing::warn!(
                        partition = self.partition,
                        group = %self.group,
                        "Consumer group missing, joining again"
                    );
                    self.join(&mut shutdown_rx).await
                }
                _ => true,
            };
            if !resumed {
                break;
            }
        }

        tracing::info!(partition = self.partition, "Event consumer stopped");
    }

    /// Sleep for the fetch backoff. Returns `false` if shutdown was signalled
    /// while waiting.
    async fn backoff(&self, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(self.fetch_backoff) => false,
            _ = shutdown_rx.wait_for(|stop| *stop) => true,
        };
        !interrupted && !stopping(shutdown_rx)
    }
}

/// Shutdown was signalled, or every sender is gone.
fn stopping(shutdown_rx: &watch::Receiver<bool>) -> bool {
    *shutdown_rx.borrow() || shutdown_rx.has_changed().is_err()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wellness_core::{ClientEventKind, ClientRecord};
    use wellness_events::InMemoryBroker;
    use wellness_storage::{ClientRepository, InMemoryCache, InMemoryClientRepository, InMemorySearchIndex};
    use wellness_test_utils::fixtures::sample_client;

    const GROUP: &str = "wellness-group";

    fn config() -> SyncConfig {
        SyncConfig {
            poll_wait: Duration::from_millis(50),
            fetch_backoff: Duration::from_secs(5),
            ..SyncConfig::default()
        }
    }

    fn consumer(broker: &InMemoryBroker) -> (EventConsumer, InMemoryClientRepository, Arc<ConsumerMetrics>) {
        let repo = InMemoryClientRepository::new();
        let handlers = ReconciliationHandlers::new(
            Arc::new(repo.clone()),
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemorySearchIndex::new()),
        );
        let metrics = Arc::new(ConsumerMetrics::new());
        let consumer = EventConsumer::new(
            Arc::new(broker.clone()),
            handlers,
            &config(),
            0,
            metrics.clone(),
        );
        (consumer, repo, metrics)
    }

    async fn append(broker: &InMemoryBroker, kind: ClientEventKind, client: &ClientRecord) {
        let payload = ClientEvent::new(kind, client.clone())
            .encode()
            .expect("encode should succeed");
        broker
            .append_to(0, &client.id.to_string(), &payload)
            .await
            .expect("append should succeed");
    }

    #[tokio::test]
    async fn test_poll_once_applies_and_commits() {
        let broker = InMemoryBroker::new("client_events", 1);
        let (consumer, repo, metrics) = consumer(&broker);
        append(&broker, ClientEventKind::Created, &sample_client(1)).await;

        assert_eq!(consumer.poll_once().await, Poll::Handled(Outcome::Applied));
        assert!(repo.get(1).await.expect("get").is_some());
        assert_eq!(broker.committed(GROUP, 0).await, Some(1));
        assert_eq!(metrics.snapshot().committed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_once_idle_when_empty() {
        let broker = InMemoryBroker::new("client_events", 1);
        let (consumer, _, metrics) = consumer(&broker);

        assert_eq!(consumer.poll_once().await, Poll::Idle);
        assert_eq!(metrics.snapshot().received, 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_committed() {
        let broker = InMemoryBroker::new("client_events", 1);
        let (consumer, _, metrics) = consumer(&broker);
        broker
            .append_to(0, "1", b"{not json")
            .await
            .expect("append should succeed");

        assert_eq!(consumer.poll_once().await, Poll::Malformed);
        assert_eq!(broker.committed(GROUP, 0).await, Some(1));
        assert_eq!(metrics.snapshot().malformed, 1);
    }

    #[tokio::test]
    async fn test_fetch_error_reports_transport_error() {
        let broker = InMemoryBroker::new("client_events", 1);
        let (consumer, _, metrics) = consumer(&broker);
        broker.fail_next_fetches(1);

        assert_eq!(consumer.poll_once().await, Poll::TransportError);
        assert_eq!(metrics.snapshot().fetch_errors, 1);
        assert_eq!(broker.committed(GROUP, 0).await, None);
    }

    #[tokio::test]
    async fn test_missing_group_reports_group_lost() {
        let broker = InMemoryBroker::new("client_events", 1);
        let (consumer, _, metrics) = consumer(&broker);
        broker.drop_group(GROUP).await;

        assert_eq!(consumer.poll_once().await, Poll::GroupLost);
        assert_eq!(metrics.snapshot().fetch_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_rejoins_after_group_is_lost() {
        let broker = InMemoryBroker::new("client_events", 1);
        let (consumer, repo, _) = consumer(&broker);
        append(&broker, ClientEventKind::Created, &sample_client(1)).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(consumer.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(repo.get(1).await.expect("get").is_some());

        broker.drop_group(GROUP).await;
        append(&broker, ClientEventKind::Created, &sample_client(2)).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(
            repo.get(2).await.expect("get").is_some(),
            "consumer should rejoin and keep consuming"
        );
        assert_eq!(broker.committed(GROUP, 0).await, Some(2));

        shutdown_tx.send(true).expect("consumer should be listening");
        task.await.expect("consumer task should not panic");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let broker = InMemoryBroker::new("client_events", 1);
        let (consumer, repo, _) = consumer(&broker);
        append(&broker, ClientEventKind::Created, &sample_client(3)).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(consumer.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(true).expect("consumer should be listening");
        task.await.expect("consumer task should not panic");

        assert!(repo.get(3).await.expect("get").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_when_sender_dropped() {
        let broker = InMemoryBroker::new("client_events", 1);
        let (consumer, _, _) = consumer(&broker);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(consumer.run(shutdown_rx));
        drop(shutdown_tx);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("consumer should exit")
            .expect("consumer task should not panic");
    }
}
