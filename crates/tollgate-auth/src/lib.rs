//! Signed credentials for tollgate.
//!
//! This crate issues and validates the HMAC-signed, time-bounded credentials
//! every inbound call presents:
//!
//! - Access tokens: short TTL, full identity claims
//! - Refresh tokens: long TTL, subject only
//! - Exact expiry checks, optional not-before enforcement
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   AuthGate /     │────▶│  TokenValidator  │
//! │   RateLimiter    │     │  (trait)         │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │  TokenService    │
//!                          │  (HS256 JWT)     │
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use tollgate_auth::{TokenConfig, TokenService};
//! use tollgate_core::UserId;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = TokenService::new(&TokenConfig {
//!     secret: "change-me".to_string(),
//!     ..TokenConfig::default()
//! })?;
//!
//! let user_id: UserId = "U1".parse()?;
//! let token = service.issue_access(&user_id, "u1@example.com", "member", None)?;
//! let claims = service.validate(&token)?;
//! assert_eq!(claims.user_id, user_id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod claims;
pub mod error;
pub mod jwt;

use std::fmt;

use serde::Deserialize;

pub use claims::{Claims, TokenKind};
pub use error::{AuthError, Result};
pub use jwt::{TokenService, TokenValidator};

/// Configuration for credential signing.
#[derive(Clone, Deserialize)]
pub struct TokenConfig {
    /// HMAC signing secret.
    #[serde(default)]
    pub secret: String,
    /// Access token lifetime in seconds.
    #[serde(default = "TokenConfig::default_access_ttl")]
    pub access_ttl_seconds: u64,
    /// Refresh token lifetime in seconds.
    #[serde(default = "TokenConfig::default_refresh_ttl")]
    pub refresh_ttl_seconds: u64,
    /// Reject credentials presented before their not-before time.
    #[serde(default)]
    pub enforce_not_before: bool,
}

impl TokenConfig {
    const fn default_access_ttl() -> u64 {
        15 * 60
    }

    const fn default_refresh_ttl() -> u64 {
        7 * 24 * 60 * 60
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_ttl_seconds: Self::default_access_ttl(),
            refresh_ttl_seconds: Self::default_refresh_ttl(),
            enforce_not_before: false,
        }
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .field("enforce_not_before", &self.enforce_not_before)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TokenConfig::default();
        assert!(config.secret.is_empty());
        assert_eq!(config.access_ttl_seconds, 900);
        assert_eq!(config.refresh_ttl_seconds, 604_800);
        assert!(!config.enforce_not_before);
    }

    #[test]
    fn debug_redacts_secret() {
        let config = TokenConfig {
            secret: "super-secret".to_string(),
            ..TokenConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn auth_error_status_codes() {
        assert_eq!(AuthError::ExpiredToken.http_status_code(), 401);
        assert_eq!(AuthError::InvalidToken("x".into()).http_status_code(), 401);
        assert_eq!(AuthError::MissingCredential.http_status_code(), 401);
        assert_eq!(
            AuthError::KeyMisconfigured("x".into()).http_status_code(),
            500
        );
    }

    #[test]
    fn auth_error_retriable() {
        assert!(AuthError::ExpiredToken.is_retriable());
        assert!(!AuthError::InvalidToken("x".into()).is_retriable());
        assert!(!AuthError::MissingCredential.is_retriable());
    }
}
