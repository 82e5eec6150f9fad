//! Records stored in the database and returned to callers.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tollgate_core::EntryId;

/// Free-form fields of a stream entry.
pub type Fields = BTreeMap<String, String>;

/// An immutable entry in a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Broker-assigned id, monotonically increasing within the stream.
    pub id: EntryId,
    /// The entry's fields.
    pub fields: Fields,
}

/// An entry handed to a consumer, with its delivery count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedEntry {
    /// The entry.
    pub entry: StreamEntry,
    /// How many times the entry has been delivered to the group, this
    /// delivery included.
    pub delivery_count: u32,
}

/// An entry claimed by a consumer but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    /// The entry id.
    pub id: EntryId,
    /// The consumer currently holding the entry.
    pub consumer: String,
    /// Number of deliveries so far.
    pub delivery_count: u32,
    /// When the entry was last delivered.
    pub last_delivered: DateTime<Utc>,
}

impl PendingEntry {
    /// How long the entry has been pending since its last delivery.
    #[must_use]
    pub fn idle_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_delivered).to_std().unwrap_or_default()
    }
}

/// Where a newly created consumer group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStart {
    /// Deliver every entry already in the stream.
    #[default]
    Beginning,
    /// Deliver only entries appended after the group is created.
    Latest,
}

/// Persisted stream metadata.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct StreamMeta {
    /// The last id assigned, `0-0` for a fresh stream.
    pub last_id: EntryId,
    /// Number of entries currently stored.
    pub length: u64,
}

impl Default for StreamMeta {
    fn default() -> Self {
        Self {
            last_id: EntryId::MIN,
            length: 0,
        }
    }
}

/// Persisted consumer group cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GroupRecord {
    /// The last id delivered to the group.
    pub last_delivered: EntryId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_time() {
        let now = Utc::now();
        let pending = PendingEntry {
            id: EntryId::new(1, 0),
            consumer: "c1".to_string(),
            delivery_count: 1,
            last_delivered: now - chrono::Duration::seconds(30),
        };
        assert_eq!(pending.idle_at(now), Duration::from_secs(30));
    }

    #[test]
    fn idle_time_clamps_future_deliveries() {
        let now = Utc::now();
        let pending = PendingEntry {
            id: EntryId::new(1, 0),
            consumer: "c1".to_string(),
            delivery_count: 1,
            last_delivered: now + chrono::Duration::seconds(5),
        };
        assert_eq!(pending.idle_at(now), Duration::ZERO);
    }
}
