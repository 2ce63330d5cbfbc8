//! In-memory partitioned log.
//!
//! Behaves like a Kafka topic: each group has a read position and a
//! committed offset per partition. A fresh [`join`](EventBroker::join) starts
//! reading at the committed offset, so uncommitted records are delivered
//! again, which is the at-least-once contract of a real broker.
//!
//! Includes fault injection for exercising consumer and publisher error paths.

use crate::broker::{partition_for, BrokerRecord, Cursor, EventBroker, SendReceipt};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use wellness_core::{BrokerError, WellnessResult};

#[derive(Debug, Default)]
struct GroupState {
    /// Next offset handed out by `fetch`, per partition
    positions: HashMap<u32, u64>,
    /// Next offset to resume from after a rejoin, per partition
    committed: HashMap<u32, u64>,
}

#[derive(Debug, Default)]
struct LogState {
    partitions: Vec<Vec<BrokerRecord>>,
    groups: HashMap<String, GroupState>,
    /// Groups removed broker-side; fetches fail until the group is joined again
    dropped: HashSet<String>,
}

#[derive(Debug, Default)]
struct Faults {
    failing_fetches: AtomicU32,
    failing_sends: AtomicU32,
    send_delay_ms: AtomicU64,
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-memory broker for tests and single-process runs.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    topic: String,
    state: Arc<Mutex<LogState>>,
    notifiers: Arc<Vec<Notify>>,
    faults: Arc<Faults>,
}

impl InMemoryBroker {
    pub fn new(topic: impl Into<String>, partitions: u32) -> Self {
        let partitions = partitions.max(1);
        Self {
            topic: topic.into(),
            state: Arc::new(Mutex::new(LogState {
                partitions: (0..partitions).map(|_| Vec::new()).collect(),
                groups: HashMap::new(),
                dropped: HashSet::new(),
            })),
            notifiers: Arc::new((0..partitions).map(|_| Notify::new()).collect()),
            faults: Arc::new(Faults::default()),
        }
    }

    /// The next `n` fetches fail with a transport error.
    pub fn fail_next_fetches(&self, n: u32) {
        self.faults.failing_fetches.store(n, Ordering::SeqCst);
    }

    /// Remove `group` and its cursors, as when the broker loses the group.
    /// Fetches for it fail until it is joined again.
    pub async fn drop_group(&self, group: &str) {
        let mut state = self.state.lock().await;
        state.groups.remove(group);
        state.dropped.insert(group.to_string());
    }

    /// The next `n` sends fail with a transport error.
    pub fn fail_next_sends(&self, n: u32) {
        self.faults.failing_sends.store(n, Ordering::SeqCst);
    }

    /// Delay every send by `delay` before it is appended.
    pub fn delay_sends(&self, delay: Duration) {
        self.faults
            .send_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Append directly to a partition, bypassing key routing.
    pub async fn append_to(&self, partition: u32, key: &str, payload: &[u8]) -> WellnessResult<Cursor> {
        let cursor = {
            let mut state = self.state.lock().await;
            let count = state.partitions.len() as u32;
            let log = state
                .partitions
                .get_mut(partition as usize)
                .ok_or(BrokerError::PartitionOutOfRange {
                    partition,
                    partitions: count,
                })?;
            let cursor = Cursor::from_offset(log.len() as u64);
            log.push(BrokerRecord {
                partition,
                cursor: cursor.clone(),
                key: key.to_string(),
                payload: payload.to_vec(),
            });
            cursor
        };
        if let Some(notify) = self.notifiers.get(partition as usize) {
            notify.notify_waiters();
        }
        Ok(cursor)
    }

    /// Every record appended to `partition`, in order.
    pub async fn records(&self, partition: u32) -> Vec<BrokerRecord> {
        self.state
            .lock()
            .await
            .partitions
            .get(partition as usize)
            .cloned()
            .unwrap_or_default()
    }

    /// Total records across all partitions.
    pub async fn len(&self) -> usize {
        self.state.lock().await.partitions.iter().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Committed offset (next to read) of `group` on `partition`.
    pub async fn committed(&self, group: &str, partition: u32) -> Option<u64> {
        self.state
            .lock()
            .await
            .groups
            .get(group)
            .and_then(|g| g.committed.get(&partition).copied())
    }

    fn check_partition(&self, partition: u32) -> WellnessResult<()> {
        let partitions = self.partition_count();
        if partition >= partitions {
            return Err(BrokerError::PartitionOutOfRange {
                partition,
                partitions,
            }
            .into());
        }
        Ok(())
    }

    async fn try_take(&self, group: &str, partition: u32) -> Option<BrokerRecord> {
        let mut state = self.state.lock().await;
        if state.dropped.contains(group) {
            return None;
        }
        let LogState {
            partitions, groups, ..
        } = &mut *state;
        let group = groups.entry(group.to_string()).or_default();
        let committed = group.committed.get(&partition).copied().unwrap_or(0);
        let position = group.positions.entry(partition).or_insert(committed);
        let record = partitions
            .get(partition as usize)
            .and_then(|log| log.get(*position as usize))
            .cloned()?;
        *position += 1;
        Some(record)
    }
}

#[async_trait]
impl EventBroker for InMemoryBroker {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partition_count(&self) -> u32 {
        self.notifiers.len() as u32
    }

    async fn send(&self, key: &str, payload: &[u8]) -> WellnessResult<SendReceipt> {
        let delay = Duration::from_millis(self.faults.send_delay_ms.load(Ordering::SeqCst));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if take_one(&self.faults.failing_sends) {
            return Err(BrokerError::Unavailable {
                reason: "injected send failure".to_string(),
            }
            .into());
        }
        let partition = partition_for(key, self.partition_count());
        let cursor = self.append_to(partition, key, payload).await?;
        Ok(SendReceipt { partition, cursor })
    }

    async fn join(&self, group: &str, partition: u32) -> WellnessResult<()> {
        self.check_partition(partition)?;
        let mut state = self.state.lock().await;
        state.dropped.remove(group);
        let group = state.groups.entry(group.to_string()).or_default();
        let committed = group.committed.get(&partition).copied().unwrap_or(0);
        group.positions.insert(partition, committed);
        Ok(())
    }

    async fn fetch(
        &self,
        group: &str,
        _consumer: &str,
        partition: u32,
        wait: Duration,
    ) -> WellnessResult<Option<BrokerRecord>> {
        self.check_partition(partition)?;
        if take_one(&self.faults.failing_fetches) {
            return Err(BrokerError::Unavailable {
                reason: "injected fetch failure".to_string(),
            }
            .into());
        }
        if self.state.lock().await.dropped.contains(group) {
            return Err(BrokerError::GroupMissing {
                group: group.to_string(),
                partition,
            }
            .into());
        }

        let notify = &self.notifiers[partition as usize];
        let deadline = Instant::now() + wait;
        loop {
            // Register for wakeups before checking, so an append between the
            // check and the wait is not missed.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(record) = self.try_take(group, partition).await {
                return Ok(Some(record));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn commit(&self, group: &str, record: &BrokerRecord) -> WellnessResult<()> {
        self.check_partition(record.partition)?;
        let offset = record.cursor.offset().ok_or_else(|| BrokerError::Rejected {
            reason: format!("cursor {} is not an offset", record.cursor),
        })?;
        let mut state = self.state.lock().await;
        let group = state.groups.entry(group.to_string()).or_default();
        let committed = group.committed.entry(record.partition).or_insert(0);
        *committed = (*committed).max(offset + 1);
        Ok(())
    }

    async fn ping(&self) -> WellnessResult<()> {
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
