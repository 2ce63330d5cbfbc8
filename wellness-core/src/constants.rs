//! Constants for the wellness synchronization pipeline
//!
//! Wire names, key formats and default tunables. Everything configurable
//! through the environment starts from one of these values.

// ============================================================================
// EVENT TRANSPORT
// ============================================================================

/// Topic every client event is published to.
pub const CLIENT_EVENTS_TOPIC: &str = "client_events";

/// Default consumer group for the reconciliation workers.
pub const DEFAULT_CONSUMER_GROUP: &str = "wellness-group";

/// Default consumer name inside the group.
pub const DEFAULT_CONSUMER_NAME: &str = "wellness-consumer";

/// Default number of partitions of the client event topic.
pub const DEFAULT_PARTITIONS: u32 = 1;

/// How long a single fetch blocks waiting for the next record (seconds).
pub const DEFAULT_POLL_WAIT_SECS: u64 = 10;

/// Fixed backoff after a transport error before fetching again (seconds).
pub const DEFAULT_FETCH_BACKOFF_SECS: u64 = 5;

// ============================================================================
// PUBLISHING
// ============================================================================

/// Upper bound on a single broker send (seconds).
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 5;

/// Number of outbound shards; events for one client always share a shard.
pub const DEFAULT_PUBLISH_SHARDS: usize = 4;

/// Capacity of each outbound shard queue.
pub const DEFAULT_PUBLISH_QUEUE_CAPACITY: usize = 1024;

/// Send attempts per event. One means a single best-effort send.
pub const DEFAULT_PUBLISH_ATTEMPTS: u32 = 1;

/// Delay between send attempts when more than one is configured (milliseconds).
pub const PUBLISH_RETRY_DELAY_MS: u64 = 200;

// ============================================================================
// EVENT WIRE NAMES
// ============================================================================

pub const EVENT_CLIENT_CREATED: &str = "client_created";
pub const EVENT_CLIENT_UPDATED: &str = "client_updated";
pub const EVENT_CLIENT_DELETED: &str = "client_deleted";

// ============================================================================
// DERIVED STORES
// ============================================================================

/// Prefix of every cache key: `client:{id}`.
pub const CACHE_KEY_PREFIX: &str = "client:";

/// Cache entry lifetime (24 hours).
pub const CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Per-operation timeout for cache round trips (milliseconds).
pub const DEFAULT_CACHE_TIMEOUT_MS: u64 = 2_000;

/// Name of the search index holding client documents.
pub const SEARCH_INDEX_NAME: &str = "clients";

// ============================================================================
// PROCESS LIFECYCLE
// ============================================================================

/// Connection attempts made at startup before giving up.
pub const DEFAULT_STARTUP_RETRIES: u32 = 5;

/// Delay between startup connection attempts (seconds).
pub const DEFAULT_STARTUP_RETRY_DELAY_SECS: u64 = 3;

/// Timeout applied to each readiness probe (milliseconds).
pub const HEALTH_CHECK_TIMEOUT_MS: u64 = 2_000;

// ============================================================================
// VALIDATION
// ============================================================================

pub const MIN_FULL_NAME_LEN: usize = 2;
pub const MAX_FULL_NAME_LEN: usize = 100;

