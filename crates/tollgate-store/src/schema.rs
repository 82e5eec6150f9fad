//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Stream metadata (last assigned id, length), keyed by `name(stream)`.
    pub const STREAMS: &str = "streams";

    /// Stream entries, keyed by `name(stream) || entry_id`.
    pub const ENTRIES: &str = "entries";

    /// Consumer group cursors, keyed by `name(stream) || name(group)`.
    pub const GROUPS: &str = "groups";

    /// Pending entries, keyed by `name(stream) || name(group) || entry_id`.
    pub const PENDING: &str = "pending";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::STREAMS, cf::ENTRIES, cf::GROUPS, cf::PENDING]
}
