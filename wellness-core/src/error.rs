//! Error types for wellness operations

use crate::ClientId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which store an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKind {
    SystemOfRecord,
    Cache,
    SearchIndex,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreKind::SystemOfRecord => "system of record",
            StoreKind::Cache => "cache",
            StoreKind::SearchIndex => "search index",
        };
        f.write_str(name)
    }
}

/// Storage layer errors (system of record and derived stores).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Client not found in {store}: id {id}")]
    NotFound { store: StoreKind, id: ClientId },

    #[error("Uniqueness conflict in {store} for id {id}: {reason}")]
    Conflict {
        store: StoreKind,
        id: ClientId,
        reason: String,
    },

    #[error("{store} unavailable: {reason}")]
    Unavailable { store: StoreKind, reason: String },

    #[error("{store} operation failed: {reason}")]
    OperationFailed { store: StoreKind, reason: String },

    #[error("Serialization failed for {store}: {reason}")]
    Serialization { store: StoreKind, reason: String },
}

/// Event transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Broker unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Broker call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Broker rejected request: {reason}")]
    Rejected { reason: String },

    #[error("Consumer group {group} does not exist on partition {partition}")]
    GroupMissing { group: String, partition: u32 },

    #[error("Partition {partition} out of range (topic has {partitions})")]
    PartitionOutOfRange { partition: u32, partitions: u32 },

    #[error("Outbound queue for shard {shard} is full")]
    QueueFull { shard: usize },

    #[error("Outbound queue closed")]
    Closed,
}

/// Envelope encoding/decoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("Malformed event envelope: {reason}")]
    Malformed { reason: String },

    #[error("Event type {event} cannot be encoded")]
    NotEncodable { event: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all wellness errors.
#[derive(Debug, Clone, Error)]
pub enum WellnessError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl WellnessError {
    /// Infrastructure was temporarily unreachable; retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WellnessError::Storage(StorageError::Unavailable { .. })
                | WellnessError::Broker(BrokerError::Unavailable { .. })
                | WellnessError::Broker(BrokerError::Timeout { .. })
        )
    }

    /// A uniqueness constraint rejected the write.
    pub fn is_conflict(&self) -> bool {
        matches!(self, WellnessError::Storage(StorageError::Conflict { .. }))
    }

    /// The referenced client does not exist in the addressed store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, WellnessError::Storage(StorageError::NotFound { .. }))
    }

    /// The consumer group vanished from the broker and must be joined again.
    pub fn is_group_missing(&self) -> bool {
        matches!(self, WellnessError::Broker(BrokerError::GroupMissing { .. }))
    }

    /// The payload could not be decoded.
    pub fn is_malformed(&self) -> bool {
        matches!(self, WellnessError::Event(EventError::Malformed { .. }))
    }
}

/// Result type alias for wellness operations.
pub type WellnessResult<T> = Result<T, WellnessError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            store: StoreKind::SystemOfRecord,
            id: 42,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("not found"));
        assert!(msg.contains("system of record"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn test_broker_error_display_timeout() {
        let err = BrokerError::Timeout { after_ms: 5000 };
        assert!(format!("{}", err).contains("5000ms"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "WELLNESS_PARTITIONS".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("WELLNESS_PARTITIONS"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_classification() {
        let unavailable = WellnessError::from(StorageError::Unavailable {
            store: StoreKind::Cache,
            reason: "connection refused".to_string(),
        });
        assert!(unavailable.is_transient());
        assert!(!unavailable.is_conflict());

        let timeout = WellnessError::from(BrokerError::Timeout { after_ms: 10 });
        assert!(timeout.is_transient());

        let conflict = WellnessError::from(StorageError::Conflict {
            store: StoreKind::SystemOfRecord,
            id: 7,
            reason: "duplicate key".to_string(),
        });
        assert!(conflict.is_conflict());
        assert!(!conflict.is_transient());

        let missing = WellnessError::from(StorageError::NotFound {
            store: StoreKind::SystemOfRecord,
            id: 7,
        });
        assert!(missing.is_not_found());

        let malformed = WellnessError::from(EventError::Malformed {
            reason: "eof".to_string(),
        });
        assert!(malformed.is_malformed());
        assert!(!malformed.is_transient());

        let lost = WellnessError::from(BrokerError::GroupMissing {
            group: "wellness-group".to_string(),
            partition: 1,
        });
        assert!(lost.is_group_missing());
        assert!(!lost.is_transient());
    }

    #[test]
    fn test_wellness_error_from_variants() {
        let validation = WellnessError::from(ValidationError::RequiredFieldMissing {
            field: "email".to_string(),
        });
        assert!(matches!(validation, WellnessError::Validation(_)));

        let config = WellnessError::from(ConfigError::MissingRequired {
            field: "url".to_string(),
        });
        assert!(matches!(config, WellnessError::Config(_)));

        let broker = WellnessError::from(BrokerError::Closed);
        assert!(matches!(broker, WellnessError::Broker(_)));
    }
}
