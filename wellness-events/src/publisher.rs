//! Outbound event publisher
//!
//! The write path calls [`EventPublisher::publish`] after a successful
//! mutation. The call encodes the envelope and hands it to a bounded,
//! key-sharded queue without waiting; a worker per shard sends to the broker
//! with a timeout. All events for one client share a shard, so they reach the
//! broker in submission order.
//!
//! Failures never reach the caller. A full queue or a failed send is logged
//! and counted, and the event is dropped.

use crate::broker::{partition_for, EventBroker};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use wellness_core::{
    ClientEvent, ClientEventKind, ClientId, ClientRecord, SyncConfig, WellnessError,
    PUBLISH_RETRY_DELAY_MS,
};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Number of shard workers
    pub shards: usize,
    /// Queue capacity per shard
    pub queue_capacity: usize,
    /// Upper bound on one broker send
    pub send_timeout: Duration,
    /// Send attempts per event
    pub send_attempts: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for PublisherConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            shards: config.publish_shards.max(1),
            queue_capacity: config.publish_queue_capacity.max(1),
            send_timeout: config.publish_timeout,
            send_attempts: config.publish_attempts.max(1),
            retry_delay: Duration::from_millis(PUBLISH_RETRY_DELAY_MS),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct PublisherMetrics {
    /// Events accepted into a shard queue
    pub enqueued: AtomicU64,
    /// Events the broker acknowledged
    pub sent: AtomicU64,
    /// Events dropped because their shard queue was full or closed
    pub dropped_queue_full: AtomicU64,
    /// Events dropped after every send attempt failed
    pub dropped_send_failed: AtomicU64,
    /// Events that could not be encoded
    pub encode_failures: AtomicU64,
}

impl PublisherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PublisherSnapshot {
        PublisherSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped_queue_full: self.dropped_queue_full.load(Ordering::Relaxed),
            dropped_send_failed: self.dropped_send_failed.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherSnapshot {
    pub enqueued: u64,
    pub sent: u64,
    pub dropped_queue_full: u64,
    pub dropped_send_failed: u64,
    pub encode_failures: u64,
}

// ============================================================================
// PUBLISHER
// ============================================================================

#[derive(Debug)]
struct Outbound {
    key: String,
    client_id: ClientId,
    kind: ClientEventKind,
    payload: Vec<u8>,
}

/// Cloneable front of the outbound queues.
#[derive(Clone)]
pub struct EventPublisher {
    shards: Arc<Vec<mpsc::Sender<Outbound>>>,
    metrics: Arc<PublisherMetrics>,
}

/// Owns the shard workers. Dropping it also stops them once their queues
/// are drained, but only [`shutdown`](Self::shutdown) waits for that.
pub struct PublisherHandle {
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    metrics: Arc<PublisherMetrics>,
}

impl EventPublisher {
    /// Spawn one worker per shard onto the current runtime.
    pub fn start(broker: Arc<dyn EventBroker>, config: PublisherConfig) -> (Self, PublisherHandle) {
        let metrics = Arc::new(PublisherMetrics::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shard_count = config.shards.max(1);

        let mut senders = Vec::with_capacity(shard_count);
        let mut workers = Vec::with_capacity(shard_count);
        for shard in 0..shard_count {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            senders.push(tx);
            workers.push(tokio::spawn(shard_worker(
                shard,
                rx,
                Arc::clone(&broker),
                config.clone(),
                Arc::clone(&metrics),
                shutdown_rx.clone(),
            )));
        }

        tracing::info!(
            shards = shard_count,
            queue_capacity = config.queue_capacity,
            send_timeout_ms = config.send_timeout.as_millis() as u64,
            send_attempts = config.send_attempts,
            topic = %broker.topic(),
            "Event publisher started"
        );

        let publisher = Self {
            shards: Arc::new(senders),
            metrics: Arc::clone(&metrics),
        };
        let handle = PublisherHandle {
            shutdown_tx,
            workers,
            metrics,
        };
        (publisher, handle)
    }

    /// Queue an event for `snapshot`. Never blocks and never fails.
    pub fn publish(&self, kind: ClientEventKind, snapshot: &ClientRecord) {
        let payload = match ClientEvent::new(kind, snapshot.clone()).encode() {
            Ok(payload) => payload,
            Err(e) => {
                self.metrics.encode_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    client_id = snapshot.id,
                    event = %kind,
                    error = %e,
                    "Failed to encode client event, dropping"
                );
                return;
            }
        };

        let key = snapshot.id.to_string();
        let shard = partition_for(&key, self.shards.len() as u32) as usize;
        let outbound = Outbound {
            key,
            client_id: snapshot.id,
            kind,
            payload,
        };

        match self.shards[shard].try_send(outbound) {
            Ok(()) => {
                self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.metrics
                    .dropped_queue_full
                    .fetch_add(1, Ordering::Relaxed);
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "publisher stopped",
                };
                tracing::warn!(
                    client_id = snapshot.id,
                    event = %kind,
                    shard,
                    reason,
                    "Dropping client event"
                );
            }
        }
    }

    pub fn metrics(&self) -> Arc<PublisherMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl PublisherHandle {
    /// Stop accepting work, drain every queue, and wait for the workers.
    pub async fn shutdown(self) -> PublisherSnapshot {
        let _ = self.shutdown_tx.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Publisher worker panicked");
            }
        }
        let snapshot = self.metrics.snapshot();
        tracing::info!(
            enqueued = snapshot.enqueued,
            sent = snapshot.sent,
            dropped_queue_full = snapshot.dropped_queue_full,
            dropped_send_failed = snapshot.dropped_send_failed,
            encode_failures = snapshot.encode_failures,
            "Event publisher stopped"
        );
        snapshot
    }
}

// ============================================================================
// SHARD WORKER
// ============================================================================

async fn shard_worker(
    shard: usize,
    mut rx: mpsc::Receiver<Outbound>,
    broker: Arc<dyn EventBroker>,
    config: PublisherConfig,
    metrics: Arc<PublisherMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            next = rx.recv() => match next {
                Some(outbound) => deliver(&*broker, &config, &metrics, outbound).await,
                None => break,
            },

            _ = shutdown_rx.changed() => {
                rx.close();
                while let Some(outbound) = rx.recv().await {
                    deliver(&*broker, &config, &metrics, outbound).await;
                }
                break;
            }
        }
    }
    tracing::debug!(shard, "Publisher shard drained");
}

async fn deliver(
    broker: &dyn EventBroker,
    config: &PublisherConfig,
    metrics: &PublisherMetrics,
    outbound: Outbound,
) {
    let attempts = config.send_attempts.max(1);
    let mut last_error: Option<WellnessError> = None;

    for attempt in 1..=attempts {
        let sent = tokio::time::timeout(
            config.send_timeout,
            broker.send(&outbound.key, &outbound.payload),
        )
        .await;

        match sent {
            Ok(Ok(receipt)) => {
                metrics.sent.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    client_id = outbound.client_id,
                    event = %outbound.kind,
                    partition = receipt.partition,
                    cursor = %receipt.cursor,
                    "Published client event"
                );
                return;
            }
            Ok(Err(e)) => last_error = Some(e),
            Err(_) => {
                last_error = Some(
                    wellness_core::BrokerError::Timeout {
                        after_ms: config.send_timeout.as_millis() as u64,
                    }
                    .into(),
                )
            }
        }

        if attempt < attempts {
            tokio::time::sleep(config.retry_delay).await;
        }
    }

    metrics.dropped_send_failed.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(
        client_id = outbound.client_id,
        event = %outbound.kind,
        attempts,
        error = %last_error.map(|e| e.to_string()).unwrap_or_default(),
        "Failed to publish client event, dropping"
    );
}

// =============================================================================
// TESTS
// =============================================================================
