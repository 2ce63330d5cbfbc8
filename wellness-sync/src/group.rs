//! Consumer group supervisor
//!
//! Spawns one [`EventConsumer`] per owned partition and stops them together.
//! Ownership is static: each partition of the topic must be listed in the
//! owned set of exactly one process in the group.

use crate::consumer::EventConsumer;
use crate::handlers::ReconciliationHandlers;
use crate::metrics::{ConsumerMetrics, ConsumerSnapshot};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use wellness_core::{SyncConfig, WellnessResult};
use wellness_events::EventBroker;

pub struct ConsumerGroup {
    broker: Arc<dyn EventBroker>,
    handlers: ReconciliationHandlers,
    config: SyncConfig,
}

impl ConsumerGroup {
    pub fn new(
        broker: Arc<dyn EventBroker>,
        handlers: ReconciliationHandlers,
        config: SyncConfig,
    ) -> Self {
        Self {
            broker,
            handlers,
            config,
        }
    }

    /// Spawn the consumers. Fails if the configuration is invalid.
    pub fn start(self) -> WellnessResult<ConsumerGroupHandle> {
        self.config.validate()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(ConsumerMetrics::new());
        let partitions = self.config.owned_partitions();

        let tasks = partitions
            .iter()
            .map(|&partition| {
                let consumer = EventConsumer::new(
                    self.broker.clone(),
                    self.handlers.clone(),
                    &self.config,
                    partition,
                    metrics.clone(),
                );
                tokio::spawn(consumer.run(shutdown_rx.clone()))
            })
            .collect();

        tracing::info!(
            topic = %self.config.topic,
            group = %self.config.consumer_group,
            partitions = ?partitions,
            poll_wait_secs = self.config.poll_wait.as_secs(),
            "Consumer group started"
        );

        Ok(ConsumerGroupHandle {
            shutdown_tx,
            tasks,
            metrics,
        })
    }
}

/// Running consumer group.
pub struct ConsumerGroupHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    metrics: Arc<ConsumerMetrics>,
}

impl ConsumerGroupHandle {
    pub fn metrics(&self) -> Arc<ConsumerMetrics> {
        self.metrics.clone()
    }

    /// Number of running consumers.
    pub fn consumers(&self) -> usize {
        self.tasks.len()
    }

    /// Signal shutdown and wait for every consumer to finish its current
    /// iteration.
    pub async fn stop(self) -> ConsumerSnapshot {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Consumer task panicked");
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            received = snapshot.received,
            applied = snapshot.applied,
            duplicates = snapshot.duplicates,
            stale_references = snapshot.stale_references,
            ignored = snapshot.ignored,
            malformed = snapshot.malformed,
            handler_failures = snapshot.handler_failures,
            fetch_errors = snapshot.fetch_errors,
            committed = snapshot.committed,
            commit_failures = snapshot.commit_failures,
            "Consumer group stopped"
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wellness_events::InMemoryBroker;
    use wellness_storage::{InMemoryCache, InMemoryClientRepository, InMemorySearchIndex};

    fn handlers() -> ReconciliationHandlers {
        ReconciliationHandlers::new(
            Arc::new(InMemoryClientRepository::new()),
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemorySearchIndex::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_consumer_per_owned_partition() {
        let broker = InMemoryBroker::new("client_events", 4);
        let config = SyncConfig {
            partitions: 4,
            owned_partitions: vec![3, 1, 1],
            poll_wait: Duration::from_millis(100),
            ..SyncConfig::default()
        };

        let handle = ConsumerGroup::new(Arc::new(broker), handlers(), config)
            .start()
            .expect("group should start");
        assert_eq!(handle.consumers(), 2);

        let snapshot = handle.stop().await;
        assert_eq!(snapshot.received, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let broker = InMemoryBroker::new("client_events", 1);
        let config = SyncConfig {
            owned_partitions: vec![5],
            ..SyncConfig::default()
        };

        let result = ConsumerGroup::new(Arc::new(broker), handlers(), config).start();
        assert!(result.is_err());
    }
}
