//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while issuing or validating credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The credential is malformed, forged, unsigned, or of the wrong kind.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The credential's expiry has passed.
    #[error("token expired")]
    ExpiredToken,

    /// The credential's not-before time has not been reached yet.
    #[error("token not yet valid")]
    NotYetValid,

    /// No bearer credential was presented.
    #[error("missing bearer credential")]
    MissingCredential,

    /// The signing key or token lifetimes are misconfigured.
    #[error("signing key misconfigured: {0}")]
    KeyMisconfigured(String),

    /// Signing a credential failed.
    #[error("signing failed: {0}")]
    Signing(String),
}

impl AuthError {
    /// Returns `true` if the client may succeed by obtaining a fresh token.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::ExpiredToken | Self::NotYetValid)
    }

    /// Returns `true` if this error describes the caller's credential rather
    /// than the server's configuration.
    #[must_use]
    pub const fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken(_) | Self::ExpiredToken | Self::NotYetValid | Self::MissingCredential
        )
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        if self.is_unauthenticated() {
            401
        } else {
            500
        }
    }
}
