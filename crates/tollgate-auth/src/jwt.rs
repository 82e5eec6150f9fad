//! Credential issuance and validation.
//!
//! Credentials are HS256-signed JWTs. Signature checking is delegated to
//! `jsonwebtoken`; expiry and not-before are checked here against an explicit
//! clock so the comparison is exact (no leeway).

use std::collections::HashSet;

use chrono::{DateTime, SubsecRound, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use tollgate_core::{OrgId, UserId};

use crate::claims::{Claims, TokenKind};
use crate::error::{AuthError, Result};
use crate::TokenConfig;

/// Trait for validating access credentials.
///
/// The request pipeline depends on this seam rather than on
/// [`TokenService`] directly.
pub trait TokenValidator: Send + Sync {
    /// Validate an access credential and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for malformed, forged or non-access credentials
    /// and `ExpiredToken` once the expiry has passed.
    fn validate(&self, token: &str) -> Result<Claims>;
}

/// Issues and validates signed, time-bounded credentials.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
    enforce_not_before: bool,
}

impl TokenService {
    /// Create a token service from configuration.
    ///
    /// # Errors
    ///
    /// Returns `KeyMisconfigured` if the secret is empty or a lifetime is
    /// zero or out of range.
    pub fn new(config: &TokenConfig) -> Result<Self> {
        if config.secret.is_empty() {
            return Err(AuthError::KeyMisconfigured(
                "signing secret is empty".to_string(),
            ));
        }
        let access_ttl = ttl(config.access_ttl_seconds, "access")?;
        let refresh_ttl = ttl(config.refresh_ttl_seconds, "refresh")?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Ok(Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
            enforce_not_before: config.enforce_not_before,
        })
    }

    /// Build access claims issued at `now`.
    #[must_use]
    pub fn access_claims(
        &self,
        subject: &UserId,
        email: &str,
        role: &str,
        org: Option<&OrgId>,
        now: DateTime<Utc>,
    ) -> Claims {
        let issued_at = now.trunc_subsecs(0);
        Claims {
            user_id: subject.clone(),
            email: email.to_string(),
            role: role.to_string(),
            org_id: org.cloned(),
            issued_at,
            not_before: issued_at,
            expires_at: issued_at + self.access_ttl,
            kind: TokenKind::Access,
        }
    }

    /// Build refresh claims issued at `now`.
    #[must_use]
    pub fn refresh_claims(&self, subject: &UserId, now: DateTime<Utc>) -> Claims {
        let issued_at = now.trunc_subsecs(0);
        Claims {
            user_id: subject.clone(),
            email: String::new(),
            role: String::new(),
            org_id: None,
            issued_at,
            not_before: issued_at,
            expires_at: issued_at + self.refresh_ttl,
            kind: TokenKind::Refresh,
        }
    }

    /// Sign a set of claims.
    ///
    /// # Errors
    ///
    /// Returns `Signing` if encoding fails.
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Issue an access credential for a subject.
    ///
    /// # Errors
    ///
    /// Returns `Signing` if encoding fails.
    pub fn issue_access(
        &self,
        subject: &UserId,
        email: &str,
        role: &str,
        org: Option<&OrgId>,
    ) -> Result<String> {
        let claims = self.access_claims(subject, email, role, org, Utc::now());
        tracing::debug!(user_id = %subject, expires_at = %claims.expires_at, "Issuing access token");
        self.sign(&claims)
    }

    /// Issue a refresh credential carrying only the subject.
    ///
    /// # Errors
    ///
    /// Returns `Signing` if encoding fails.
    pub fn issue_refresh(&self, subject: &UserId) -> Result<String> {
        let claims = self.refresh_claims(subject, Utc::now());
        tracing::debug!(user_id = %subject, expires_at = %claims.expires_at, "Issuing refresh token");
        self.sign(&claims)
    }

    /// Validate an access credential against the current time.
    ///
    /// # Errors
    ///
    /// See [`TokenValidator::validate`].
    pub fn validate(&self, token: &str) -> Result<Claims> {
        self.validate_at(token, TokenKind::Access, Utc::now())
    }

    /// Validate a refresh credential against the current time.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for anything but a well-signed refresh
    /// credential and `ExpiredToken` once it has expired.
    pub fn validate_refresh(&self, token: &str) -> Result<Claims> {
        self.validate_at(token, TokenKind::Refresh, Utc::now())
    }

    /// Validate a credential of the given kind as of `now`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken`, `ExpiredToken`, or (when enforced)
    /// `NotYetValid`.
    pub fn validate_at(&self, token: &str, kind: TokenKind, now: DateTime<Utc>) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AuthError::InvalidToken("signature mismatch".to_string())
                }
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;
        let claims = data.claims;

        if claims.kind != kind {
            return Err(AuthError::InvalidToken(format!(
                "expected {} token, got {}",
                kind.as_str(),
                claims.kind.as_str()
            )));
        }
        if claims.is_expired_at(now) {
            return Err(AuthError::ExpiredToken);
        }
        if self.enforce_not_before && claims.is_premature_at(now) {
            return Err(AuthError::NotYetValid);
        }

        Ok(claims)
    }
}

impl TokenValidator for TokenService {
    fn validate(&self, token: &str) -> Result<Claims> {
        TokenService::validate(self, token)
    }
}

fn ttl(seconds: u64, which: &str) -> Result<chrono::Duration> {
    if seconds == 0 {
        return Err(AuthError::KeyMisconfigured(format!(
            "{which} token lifetime must be positive"
        )));
    }
    i64::try_from(seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| AuthError::KeyMisconfigured(format!("{which} token lifetime out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&TokenConfig {
            secret: "test-secret-with-enough-entropy".to_string(),
            ..TokenConfig::default()
        })
        .unwrap()
    }

    fn user() -> UserId {
        UserId::new("U1").unwrap()
    }

    #[test]
    fn rejects_empty_secret() {
        let result = TokenService::new(&TokenConfig::default());
        assert!(matches!(result, Err(AuthError::KeyMisconfigured(_))));
    }

    #[test]
    fn rejects_zero_ttl() {
        let config = TokenConfig {
            secret: "s".to_string(),
            access_ttl_seconds: 0,
            ..TokenConfig::default()
        };
        assert!(matches!(
            TokenService::new(&config),
            Err(AuthError::KeyMisconfigured(_))
        ));
    }

    #[test]
    fn validate_returns_issued_claims() {
        let svc = service();
        let org = OrgId::new("acme").unwrap();
        let claims = svc.access_claims(&user(), "u1@example.com", "admin", Some(&org), Utc::now());
        let token = svc.sign(&claims).unwrap();

        assert_eq!(svc.validate(&token).unwrap(), claims);
    }

    #[test]
    fn issue_access_roundtrip() {
        let svc = service();
        let token = svc
            .issue_access(&user(), "u1@example.com", "member", None)
            .unwrap();
        let claims = svc.validate(&token).unwrap();
        assert_eq!(claims.user_id, user());
        assert_eq!(claims.email, "u1@example.com");
        assert_eq!(claims.role, "member");
        assert_eq!(claims.org_id, None);
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn expired_after_expiry() {
        let svc = service();
        let claims = svc.access_claims(&user(), "e", "r", None, Utc::now());
        let token = svc.sign(&claims).unwrap();

        let at_expiry = svc.validate_at(&token, TokenKind::Access, claims.expires_at);
        assert!(at_expiry.is_ok());

        let after = claims.expires_at + chrono::Duration::seconds(1);
        let result = svc.validate_at(&token, TokenKind::Access, after);
        assert!(matches!(result, Err(AuthError::ExpiredToken)));
    }

    #[test]
    fn expired_token_from_the_past() {
        let svc = service();
        let claims = svc.access_claims(
            &user(),
            "e",
            "r",
            None,
            Utc::now() - chrono::Duration::hours(2),
        );
        let token = svc.sign(&claims).unwrap();
        assert!(matches!(svc.validate(&token), Err(AuthError::ExpiredToken)));
    }

    #[test]
    fn rejects_forged_signature() {
        let svc = service();
        let other = TokenService::new(&TokenConfig {
            secret: "a-different-secret".to_string(),
            ..TokenConfig::default()
        })
        .unwrap();
        let token = other.issue_access(&user(), "e", "admin", None).unwrap();

        assert!(matches!(svc.validate(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn rejects_garbage() {
        let svc = service();
        assert!(matches!(
            svc.validate("not-a-token"),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(svc.validate(""), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let svc = service();
        let refresh = svc.issue_refresh(&user()).unwrap();
        assert!(matches!(
            svc.validate(&refresh),
            Err(AuthError::InvalidToken(_))
        ));

        let claims = svc.validate_refresh(&refresh).unwrap();
        assert_eq!(claims.user_id, user());
        assert!(claims.email.is_empty());
        assert!(claims.expires_at - claims.issued_at > chrono::Duration::hours(1));
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let svc = service();
        let access = svc.issue_access(&user(), "e", "r", None).unwrap();
        assert!(matches!(
            svc.validate_refresh(&access),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn not_before_ignored_by_default() {
        let svc = service();
        let claims = svc.access_claims(
            &user(),
            "e",
            "r",
            None,
            Utc::now() + chrono::Duration::minutes(5),
        );
        let token = svc.sign(&claims).unwrap();
        assert!(svc.validate(&token).is_ok());
    }

    #[test]
    fn not_before_enforced_when_configured() {
        let svc = TokenService::new(&TokenConfig {
            secret: "s".to_string(),
            enforce_not_before: true,
            ..TokenConfig::default()
        })
        .unwrap();
        let claims = svc.access_claims(
            &user(),
            "e",
            "r",
            None,
            Utc::now() + chrono::Duration::minutes(5),
        );
        let token = svc.sign(&claims).unwrap();
        assert!(matches!(svc.validate(&token), Err(AuthError::NotYetValid)));
    }

    #[test]
    fn trait_object_validates() {
        let svc = service();
        let token = svc.issue_access(&user(), "e", "r", None).unwrap();
        let validator: &dyn TokenValidator = &svc;
        assert_eq!(validator.validate(&token).unwrap().user_id, user());
    }
}
