//! Error types for the notification broker.

use thiserror::Error;
use tollgate_store::StoreError;

/// A result type using `BrokerError`.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors that can occur in broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The durable log could not be read or written.
    #[error("broker unavailable: {0}")]
    Unavailable(#[source] StoreError),

    /// The consumer group does not exist.
    #[error("consumer group {group} not found on stream {stream}")]
    GroupNotFound {
        /// The stream name.
        stream: String,
        /// The group name.
        group: String,
    },

    /// The caller supplied an unusable stream, group, consumer, or entry.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An entry does not describe a deliverable notification.
    #[error("malformed notification: {0}")]
    MalformedNotification(String),
}

impl BrokerError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Unavailable(_) => 503,
            Self::GroupNotFound { .. } => 404,
            Self::InvalidRequest(_) | Self::MalformedNotification(_) => 400,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<StoreError> for BrokerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::GroupNotFound { stream, group } => Self::GroupNotFound { stream, group },
            StoreError::InvalidName(_) | StoreError::EmptyEntry => {
                Self::InvalidRequest(err.to_string())
            }
            StoreError::Database(_) | StoreError::Serialization(_) => Self::Unavailable(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_classified() {
        let err = BrokerError::from(StoreError::Database("io".into()));
        assert!(matches!(err, BrokerError::Unavailable(_)));
        assert!(err.is_retriable());
        assert_eq!(err.http_status_code(), 503);

        let err = BrokerError::from(StoreError::EmptyEntry);
        assert!(matches!(err, BrokerError::InvalidRequest(_)));
        assert!(!err.is_retriable());
        assert_eq!(err.http_status_code(), 400);

        let err = BrokerError::from(StoreError::GroupNotFound {
            stream: "s".into(),
            group: "g".into(),
        });
        assert_eq!(err.http_status_code(), 404);
    }
}
