//! Synchronization pipeline configuration

use crate::*;
use std::time::Duration;

/// Settings shared by the publisher and the consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Topic (stream name prefix) carrying client events
    pub topic: String,
    /// Consumer group the reconciliation workers join
    pub consumer_group: String,
    /// Consumer name inside the group
    pub consumer_name: String,
    /// Number of partitions of the topic
    pub partitions: u32,
    /// Partitions this process consumes. Each partition must be owned by
    /// exactly one process in the group.
    pub owned_partitions: Vec<u32>,
    /// Maximum time a fetch blocks waiting for the next record
    pub poll_wait: Duration,
    /// Backoff after a transport error before the next fetch
    pub fetch_backoff: Duration,
    /// Upper bound on a single broker send
    pub publish_timeout: Duration,
    /// Number of outbound shards
    pub publish_shards: usize,
    /// Capacity of each outbound shard queue
    pub publish_queue_capacity: usize,
    /// Send attempts per event
    pub publish_attempts: u32,
    /// Whether this process runs the consumer group at all
    pub consumer_enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            topic: CLIENT_EVENTS_TOPIC.to_string(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            consumer_name: DEFAULT_CONSUMER_NAME.to_string(),
            partitions: DEFAULT_PARTITIONS,
            owned_partitions: (0..DEFAULT_PARTITIONS).collect(),
            poll_wait: Duration::from_secs(DEFAULT_POLL_WAIT_SECS),
            fetch_backoff: Duration::from_secs(DEFAULT_FETCH_BACKOFF_SECS),
            publish_timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS),
            publish_shards: DEFAULT_PUBLISH_SHARDS,
            publish_queue_capacity: DEFAULT_PUBLISH_QUEUE_CAPACITY,
            publish_attempts: DEFAULT_PUBLISH_ATTEMPTS,
            consumer_enabled: true,
        }
    }
}

impl SyncConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `WELLNESS_TOPIC` (default: `client_events`)
    /// - `WELLNESS_CONSUMER_GROUP` (default: `wellness-group`)
    /// - `WELLNESS_CONSUMER_NAME` (default: `wellness-consumer`)
    /// - `WELLNESS_PARTITIONS` (default: 1)
    /// - `WELLNESS_OWNED_PARTITIONS`: comma-separated list (default: all)
    /// - `WELLNESS_POLL_WAIT_SECS` (default: 10)
    /// - `WELLNESS_FETCH_BACKOFF_SECS` (default: 5)
    /// - `WELLNESS_PUBLISH_TIMEOUT_SECS` (default: 5)
    /// - `WELLNESS_PUBLISH_SHARDS` (default: 4)
    /// - `WELLNESS_PUBLISH_QUEUE_CAPACITY` (default: 1024)
    /// - `WELLNESS_PUBLISH_ATTEMPTS` (default: 1)
    /// - `WELLNESS_CONSUMER_ENABLED` (default: true)
    ///
    /// Unparseable values fall back to the default, except
    /// `WELLNESS_OWNED_PARTITIONS`: claiming every partition by accident
    /// would put two consumers on one partition, so a malformed list is an
    /// error. Call [`validate`](Self::validate) to reject out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let partitions = std::env::var("WELLNESS_PARTITIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.partitions);

        let owned_partitions =
            owned_partitions_from(std::env::var("WELLNESS_OWNED_PARTITIONS").ok(), partitions)?;

        Ok(Self {
            topic: std::env::var("WELLNESS_TOPIC").unwrap_or(defaults.topic),
            consumer_group: std::env::var("WELLNESS_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            consumer_name: std::env::var("WELLNESS_CONSUMER_NAME")
                .unwrap_or(defaults.consumer_name),
            partitions,
            owned_partitions,
            poll_wait: std::env::var("WELLNESS_POLL_WAIT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_wait),
            fetch_backoff: std::env::var("WELLNESS_FETCH_BACKOFF_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_backoff),
            publish_timeout: std::env::var("WELLNESS_PUBLISH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.publish_timeout),
            publish_shards: std::env::var("WELLNESS_PUBLISH_SHARDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.publish_shards),
            publish_queue_capacity: std::env::var("WELLNESS_PUBLISH_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.publish_queue_capacity),
            publish_attempts: std::env::var("WELLNESS_PUBLISH_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.publish_attempts),
            consumer_enabled: std::env::var("WELLNESS_CONSUMER_ENABLED")
                .ok()
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.consumer_enabled),
        })
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "WELLNESS_TOPIC".to_string(),
            });
        }
        if self.consumer_group.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "WELLNESS_CONSUMER_GROUP".to_string(),
            });
        }
        if self.partitions == 0 {
            return Err(invalid("WELLNESS_PARTITIONS", "0", "must be at least 1"));
        }
        if let Some(bad) = self
            .owned_partitions
            .iter()
            .find(|p| **p >= self.partitions)
        {
            return Err(invalid(
                "WELLNESS_OWNED_PARTITIONS",
                &bad.to_string(),
                &format!("must be below the partition count {}", self.partitions),
            ));
        }
        if self.poll_wait.is_zero() {
            return Err(invalid("WELLNESS_POLL_WAIT_SECS", "0", "must be positive"));
        }
        if self.publish_timeout.is_zero() {
            return Err(invalid("WELLNESS_PUBLISH_TIMEOUT_SECS", "0", "must be positive"));
        }
        if self.publish_shards == 0 {
            return Err(invalid("WELLNESS_PUBLISH_SHARDS", "0", "must be at least 1"));
        }
        if self.publish_queue_capacity == 0 {
            return Err(invalid(
                "WELLNESS_PUBLISH_QUEUE_CAPACITY",
                "0",
                "must be at least 1",
            ));
        }
        if self.publish_attempts == 0 {
            return Err(invalid("WELLNESS_PUBLISH_ATTEMPTS", "0", "must be at least 1"));
        }
        Ok(())
    }

    /// Owned partitions, sorted and deduplicated.
    pub fn owned_partitions(&self) -> Vec<u32> {
        let mut owned = self.owned_partitions.clone();
        owned.sort_unstable();
        owned.dedup();
        owned
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Unset or blank means every partition. Anything else must be a
/// comma-separated list of partition numbers.
fn owned_partitions_from(raw: Option<String>, partitions: u32) -> Result<Vec<u32>, ConfigError> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => parse_partition_list(&raw).ok_or_else(|| {
            invalid(
                "WELLNESS_OWNED_PARTITIONS",
                &raw,
                "must be a comma-separated list of partition numbers",
            )
        }),
        _ => Ok((0..partitions).collect()),
    }
}

/// Parse `"0,2, 3"`. Blank or unparseable input yields `None`.
fn parse_partition_list(raw: &str) -> Option<Vec<u32>> {
    let parts: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        return None;
    }
    parts.into_iter().map(|s| s.parse().ok()).collect()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SyncConfig::default();
        assert_eq!(config.topic, "client_events");
        assert_eq!(config.consumer_group, "wellness-group");
        assert_eq!(config.poll_wait, Duration::from_secs(10));
        assert_eq!(config.fetch_backoff, Duration::from_secs(5));
        assert_eq!(config.owned_partitions(), vec![0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_partitions() {
        let config = SyncConfig {
            partitions: 0,
            owned_partitions: vec![],
            ..SyncConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "WELLNESS_PARTITIONS"
        ));
    }

    #[test]
    fn test_validate_rejects_unowned_range() {
        let config = SyncConfig {
            partitions: 2,
            owned_partitions: vec![0, 2],
            ..SyncConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "WELLNESS_OWNED_PARTITIONS"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_publisher_settings() {
        for config in [
            SyncConfig {
                publish_shards: 0,
                ..SyncConfig::default()
            },
            SyncConfig {
                publish_queue_capacity: 0,
                ..SyncConfig::default()
            },
            SyncConfig {
                publish_attempts: 0,
                ..SyncConfig::default()
            },
        ] {
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_owned_partitions_sorted_and_deduplicated() {
        let config = SyncConfig {
            partitions: 4,
            owned_partitions: vec![3, 1, 3, 0],
            ..SyncConfig::default()
        };
        assert_eq!(config.owned_partitions(), vec![0, 1, 3]);
    }

    #[test]
    fn test_parse_partition_list() {
        assert_eq!(parse_partition_list("0, 2,3"), Some(vec![0, 2, 3]));
        assert_eq!(parse_partition_list(" , "), None);
        assert_eq!(parse_partition_list("0,x"), None);
    }

    #[test]
    fn test_malformed_owned_partitions_rejected() {
        let err = owned_partitions_from(Some("0;1".to_string()), 4)
            .expect_err("a semicolon list must not claim every partition");
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, ref value, .. }
                if field == "WELLNESS_OWNED_PARTITIONS" && value == "0;1"
        ));
        assert!(owned_partitions_from(Some("0,x".to_string()), 4).is_err());
    }

    #[test]
    fn test_unset_owned_partitions_claims_all() {
        assert_eq!(owned_partitions_from(None, 3).expect("unset"), vec![0, 1, 2]);
        assert_eq!(owned_partitions_from(Some("  ".to_string()), 2).expect("blank"), vec![0, 1]);
        assert_eq!(owned_partitions_from(Some("2, 0".to_string()), 4).expect("list"), vec![2, 0]);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
