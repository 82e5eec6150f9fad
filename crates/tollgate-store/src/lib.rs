//! `RocksDB`-backed durable stream log for tollgate.
//!
//! This crate stores append-only streams of field maps and tracks, per
//! consumer group, which entries have been handed out and which are still
//! awaiting acknowledgement.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `streams`: Stream metadata (last assigned id, length), keyed by stream
//! - `entries`: Stream entries, keyed by stream and entry id
//! - `groups`: Consumer group cursors, keyed by stream and group
//! - `pending`: Delivered but unacknowledged entries, keyed by stream, group
//!   and entry id
//!
//! ```text
//!   append ──▶ entries ──▶ read_group ──▶ pending ──▶ ack
//!                               ▲             │
//!                               └── claim ◀───┘ (idle)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use tollgate_store::{GroupStart, RocksStreamStore, StreamStore};
//!
//! let store = RocksStreamStore::open("/tmp/tollgate-db").unwrap();
//!
//! let fields = BTreeMap::from([("type".to_string(), "ping".to_string())]);
//! store.append("notifications", &fields).unwrap();
//! store
//!     .create_group("notifications", "delivery", GroupStart::Beginning)
//!     .unwrap();
//! let batch = store
//!     .read_group("notifications", "delivery", "worker-1", 10)
//!     .unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

use std::time::Duration;

pub use error::{Result, StoreError};
pub use rocks::RocksStreamStore;
pub use types::{ClaimedEntry, Fields, GroupStart, PendingEntry, StreamEntry};

use tollgate_core::EntryId;

/// The storage trait for durable streams with consumer groups.
///
/// This trait abstracts the storage layer so the broker can be exercised
/// against any implementation.
pub trait StreamStore: Send + Sync {
    /// Append an entry to a stream, creating the stream if needed.
    ///
    /// Returns the assigned id, strictly greater than every earlier id in the
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName`, `EmptyEntry`, or a database error.
    fn append(&self, stream: &str, fields: &Fields) -> Result<EntryId>;

    /// Create a consumer group on a stream.
    ///
    /// Returns `false` if the group already existed, in which case its cursor
    /// is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` or a database error.
    fn create_group(&self, stream: &str, group: &str, start: GroupStart) -> Result<bool>;

    /// Claim up to `count` entries the group has not yet seen.
    ///
    /// Each returned entry is recorded as pending for `consumer`.
    ///
    /// # Errors
    ///
    /// Returns `GroupNotFound` if the group does not exist.
    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<ClaimedEntry>>;

    /// The id of the last entry handed out to the group.
    ///
    /// `0-0` if the group has not read anything yet.
    ///
    /// # Errors
    ///
    /// Returns `GroupNotFound` if the group does not exist.
    fn last_delivered(&self, stream: &str, group: &str) -> Result<EntryId>;

    /// Acknowledge entries, removing them from the pending table.
    ///
    /// Returns how many of `ids` were actually pending.
    ///
    /// # Errors
    ///
    /// Returns `GroupNotFound` if the group does not exist.
    fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> Result<usize>;

    /// List the group's pending entries in id order.
    ///
    /// # Errors
    ///
    /// Returns `GroupNotFound` if the group does not exist.
    fn pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>>;

    /// Transfer specific pending entries idle for at least `min_idle` to
    /// `consumer`.
    ///
    /// Entries that are not pending or not idle long enough are skipped.
    ///
    /// # Errors
    ///
    /// Returns `GroupNotFound` if the group does not exist.
    fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> Result<Vec<ClaimedEntry>>;

    /// Scan the pending table and transfer up to `count` entries idle for at
    /// least `min_idle` to `consumer`.
    ///
    /// # Errors
    ///
    /// Returns `GroupNotFound` if the group does not exist.
    fn auto_claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<ClaimedEntry>>;

    /// Number of entries currently in the stream; zero if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    fn len(&self, stream: &str) -> Result<u64>;

    /// Returns `true` if the stream holds no entries.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    fn is_empty(&self, stream: &str) -> Result<bool> {
        Ok(self.len(stream)? == 0)
    }

    /// Drop the oldest entries until at most `max_len` remain.
    ///
    /// Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    fn trim(&self, stream: &str, max_len: u64) -> Result<u64>;
}
