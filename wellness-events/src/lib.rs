//! Wellness Events - Client Event Transport
//!
//! The broker contract, a stable key partitioner, two broker implementations
//! (in-memory and Redis Streams) and the outbound [`EventPublisher`] used by
//! the write path.
//!
//! ```text
//! write path ──publish──▶ shard queue ──send──▶ partition log ──fetch──▶ consumer
//! ```

mod broker;
mod memory;
mod publisher;
mod redis_stream;

pub use broker::{partition_for, BrokerRecord, Cursor, EventBroker, SendReceipt};
pub use memory::InMemoryBroker;
pub use publisher::{
    EventPublisher, PublisherConfig, PublisherHandle, PublisherMetrics, PublisherSnapshot,
};
pub use redis_stream::{BrokerConfig, RedisStreamBroker};
