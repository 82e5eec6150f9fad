//! Error types for the stream store.

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during stream store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The consumer group does not exist on the stream.
    #[error("consumer group {group} not found on stream {stream}")]
    GroupNotFound {
        /// The stream name.
        stream: String,
        /// The group name.
        group: String,
    },

    /// A stream, group, or consumer name is empty or too long.
    #[error("invalid name {0:?}: must be 1..=255 bytes")]
    InvalidName(String),

    /// An entry was appended without any fields.
    #[error("stream entries must carry at least one field")]
    EmptyEntry,

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Returns `true` if the error comes from the storage engine rather than
    /// from the caller's input.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Serialization(_))
    }
}
