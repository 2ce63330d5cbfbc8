//! Event broker contract
//!
//! A broker is a partitioned append log. Records with the same key always
//! land in the same partition, and a partition is read in append order.
//! Consumer groups track their own cursor per partition.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use wellness_core::WellnessResult;

/// Position of a record inside one partition.
///
/// Brokers choose the representation: the in-memory log uses decimal
/// offsets, Redis Streams uses entry ids such as `1700000000000-0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn from_offset(offset: u64) -> Self {
        Self(offset.to_string())
    }

    /// Numeric offset, when the cursor is one.
    pub fn offset(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a sent record landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub partition: u32,
    pub cursor: Cursor,
}

/// A record read from one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub partition: u32,
    pub cursor: Cursor,
    pub key: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait EventBroker: Send + Sync {
    fn topic(&self) -> &str;

    fn partition_count(&self) -> u32;

    /// Append a record to the partition chosen by [`partition_for`].
    async fn send(&self, key: &str, payload: &[u8]) -> WellnessResult<SendReceipt>;

    /// Register `group` on `partition`. Idempotent.
    async fn join(&self, group: &str, partition: u32) -> WellnessResult<()>;

    /// Next record for `group` on `partition`, blocking up to `wait`.
    /// `Ok(None)` means the wait elapsed with nothing to read.
    async fn fetch(
        &self,
        group: &str,
        consumer: &str,
        partition: u32,
        wait: Duration,
    ) -> WellnessResult<Option<BrokerRecord>>;

    /// Advance the group's cursor past `record`.
    async fn commit(&self, group: &str, record: &BrokerRecord) -> WellnessResult<()>;

    async fn ping(&self) -> WellnessResult<()>;
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable partition for a key: 64-bit FNV-1a modulo `partitions`.
///
/// The hash must not change between releases, or events for one client
/// could be split across partitions during a rolling deploy.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    if partitions <= 1 {
        return 0;
    }
    let hash = key.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    });
    (hash % u64::from(partitions)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_for_is_stable() {
        // Reference values of 64-bit FNV-1a.
        assert_eq!(partition_for("", u32::MAX), (0xcbf2_9ce4_8422_2325u64 % u64::from(u32::MAX)) as u32);
        assert_eq!(
            partition_for("a", u32::MAX),
            (0xaf63_dc4c_8601_ec8cu64 % u64::from(u32::MAX)) as u32
        );
    }

    #[test]
    fn test_partition_for_single_partition() {
        assert_eq!(partition_for("42", 0), 0);
        assert_eq!(partition_for("42", 1), 0);
    }

    #[test]
    fn test_partition_for_in_range_and_deterministic() {
        for id in 0..500u64 {
            let key = id.to_string();
            let p = partition_for(&key, 8);
            assert!(p < 8);
            assert_eq!(p, partition_for(&key, 8));
        }
    }

    #[test]
    fn test_cursor_offsets() {
        assert_eq!(Cursor::from_offset(12).offset(), Some(12));
        assert_eq!(Cursor::new("1700000000000-0").offset(), None);
        assert_eq!(Cursor::new("1-0").to_string(), "1-0");
    }
}
