//! Redis Streams broker
//!
//! Topic `T` with `P` partitions maps onto stream keys `T:0` .. `T:P-1`.
//! Consumer groups are native stream groups; fetching is `XREADGROUP` with
//! `COUNT 1` and `BLOCK`, and committing is `XACK`.

use crate::broker::{partition_for, BrokerRecord, Cursor, EventBroker, SendReceipt};
use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::time::Duration;
use wellness_core::{BrokerError, ConfigError, WellnessError, WellnessResult};

const FIELD_KEY: &str = "key";
const FIELD_PAYLOAD: &str = "payload";

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub url: String,
    pub pool_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 16,
        }
    }
}

impl BrokerConfig {
    /// Environment variables: `WELLNESS_BROKER_URL`, `WELLNESS_BROKER_POOL_SIZE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("WELLNESS_BROKER_URL").unwrap_or(defaults.url),
            pool_size: std::env::var("WELLNESS_BROKER_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pool_size),
        }
    }

    pub fn create_pool(&self) -> WellnessResult<Pool> {
        let mut cfg = Config::from_url(&self.url);
        cfg.pool = Some(PoolConfig::new(self.pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ConfigError::InvalidValue {
                field: "WELLNESS_BROKER_URL".to_string(),
                value: self.url.clone(),
                reason: e.to_string(),
            })?;
        Ok(pool)
    }
}

fn broker_error(err: redis::RedisError) -> WellnessError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        BrokerError::Unavailable {
            reason: err.to_string(),
        }
        .into()
    } else if err.is_timeout() {
        BrokerError::Timeout { after_ms: 0 }.into()
    } else {
        BrokerError::Rejected {
            reason: err.to_string(),
        }
        .into()
    }
}

fn is_nogroup(err: &redis::RedisError) -> bool {
    err.code() == Some("NOGROUP") || err.to_string().contains("NOGROUP")
}

/// Broker over Redis Streams.
#[derive(Clone)]
pub struct RedisStreamBroker {
    pool: Pool,
    topic: String,
    partitions: u32,
}

impl RedisStreamBroker {
    pub fn new(pool: Pool, topic: impl Into<String>, partitions: u32) -> Self {
        Self {
            pool,
            topic: topic.into(),
            partitions: partitions.max(1),
        }
    }

    /// Stream key of one partition.
    pub fn stream_key(&self, partition: u32) -> String {
        format!("{}:{}", self.topic, partition)
    }

    async fn conn(&self) -> WellnessResult<Connection> {
        self.pool.get().await.map_err(|e| {
            BrokerError::Unavailable {
                reason: format!("Failed to get Redis connection: {}", e),
            }
            .into()
        })
    }

    fn check_partition(&self, partition: u32) -> WellnessResult<()> {
        if partition >= self.partitions {
            return Err(BrokerError::PartitionOutOfRange {
                partition,
                partitions: self.partitions,
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl EventBroker for RedisStreamBroker {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partition_count(&self) -> u32 {
        self.partitions
    }

    async fn send(&self, key: &str, payload: &[u8]) -> WellnessResult<SendReceipt> {
        let partition = partition_for(key, self.partitions);
        let stream = self.stream_key(partition);
        let mut conn = self.conn().await?;
        let id: String = conn
            .xadd(
                &stream,
                "*",
                &[(FIELD_KEY, key.as_bytes()), (FIELD_PAYLOAD, payload)],
            )
            .await
            .map_err(broker_error)?;
        Ok(SendReceipt {
            partition,
            cursor: Cursor::new(id),
        })
    }

    async fn join(&self, group: &str, partition: u32) -> WellnessResult<()> {
        self.check_partition(partition)?;
        let stream = self.stream_key(partition);
        let mut conn = self.conn().await?;
        let created: redis::RedisResult<()> =
            conn.xgroup_create_mkstream(&stream, group, "0").await;
        match created {
            Ok(()) => {
                tracing::info!(stream = %stream, group = %group, "created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(broker_error(e)),
        }
    }

    async fn fetch(
        &self,
        group: &str,
        consumer: &str,
        partition: u32,
        wait: Duration,
    ) -> WellnessResult<Option<BrokerRecord>> {
        self.check_partition(partition)?;
        let stream = self.stream_key(partition);
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(1)
            .block(wait.as_millis().max(1) as usize);

        let mut conn = self.conn().await?;
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&stream], &[">"], &options)
            .await
            .map_err(|e| {
                if is_nogroup(&e) {
                    BrokerError::GroupMissing {
                        group: group.to_string(),
                        partition,
                    }
                    .into()
                } else {
                    broker_error(e)
                }
            })?;

        let Some(entry) = reply
            .into_iter()
            .flat_map(|reply| reply.keys)
            .flat_map(|key| key.ids)
            .next()
        else {
            return Ok(None);
        };

        // A missing field yields an empty payload, which the consumer drops
        // as malformed and then acknowledges.
        let key: String = entry.get(FIELD_KEY).unwrap_or_default();
        let payload: Vec<u8> = entry.get(FIELD_PAYLOAD).unwrap_or_default();
        Ok(Some(BrokerRecord {
            partition,
            cursor: Cursor::new(entry.id),
            key,
            payload,
        }))
    }

    async fn commit(&self, group: &str, record: &BrokerRecord) -> WellnessResult<()> {
        self.check_partition(record.partition)?;
        let stream = self.stream_key(record.partition);
        let mut conn = self.conn().await?;
        let _: u64 = conn
            .xack(&stream, group, &[record.cursor.as_str()])
            .await
            .map_err(broker_error)?;
        Ok(())
    }

    async fn ping(&self) -> WellnessResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(broker_error)?;
        Ok(())
    }
}
