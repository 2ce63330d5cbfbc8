//! Wellness Sync - Derived Store Reconciliation
//!
//! Consumes client events and keeps the cache and the search index
//! converging toward the system of record.
//!
//! ```text
//! broker ──fetch──▶ EventConsumer ──dispatch──▶ ReconciliationHandlers ──▶ cache / index
//!                        │
//!                        └──commit (always, after dispatch)
//! ```

mod consumer;
mod group;
mod handlers;
mod metrics;

pub use consumer::{EventConsumer, Poll};
pub use group::{ConsumerGroup, ConsumerGroupHandle};
pub use handlers::{Outcome, ReconciliationHandlers};
pub use metrics::{ConsumerMetrics, ConsumerSnapshot};
