//! Signed claims embedded in every credential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tollgate_core::{OrgId, UserId};

/// The kind of credential a set of claims belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Short-lived credential carrying the full identity.
    #[default]
    Access,
    /// Long-lived credential carrying only the subject.
    Refresh,
}

impl TokenKind {
    /// Lowercase name, as written in the `typ` claim.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// The claims carried by a signed credential.
///
/// Wire form: `{user_id, email, role, org_id, iat, nbf, exp, typ}`, with
/// timestamps in whole seconds. Refresh credentials omit the identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The subject.
    pub user_id: UserId,
    /// Subject email; empty for refresh credentials.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    /// Subject role; empty for refresh credentials.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    /// Organization the subject acts for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<OrgId>,
    /// When the credential was issued.
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,
    /// Earliest time the credential may be used.
    #[serde(rename = "nbf", with = "chrono::serde::ts_seconds")]
    pub not_before: DateTime<Utc>,
    /// When the credential expires.
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
    /// Access or refresh.
    #[serde(rename = "typ", default)]
    pub kind: TokenKind,
}

impl Claims {
    /// Returns `true` if `now` is strictly after the expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Returns `true` if `now` is before the not-before time.
    #[must_use]
    pub fn is_premature_at(&self, now: DateTime<Utc>) -> bool {
        now < self.not_before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Claims {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        Claims {
            user_id: UserId::new("U1").unwrap(),
            email: "u1@example.com".to_string(),
            role: "member".to_string(),
            org_id: Some(OrgId::new("acme").unwrap()),
            issued_at: at,
            not_before: at,
            expires_at: at + chrono::Duration::seconds(900),
            kind: TokenKind::Access,
        }
    }

    #[test]
    fn wire_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["user_id"], "U1");
        assert_eq!(json["org_id"], "acme");
        assert_eq!(json["iat"], 1_700_000_000);
        assert_eq!(json["nbf"], 1_700_000_000);
        assert_eq!(json["exp"], 1_700_000_900);
        assert_eq!(json["typ"], "access");
    }

    #[test]
    fn refresh_claims_omit_identity_fields() {
        let mut claims = sample();
        claims.email.clear();
        claims.role.clear();
        claims.org_id = None;
        claims.kind = TokenKind::Refresh;

        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("email").is_none());
        assert!(json.get("role").is_none());
        assert!(json.get("org_id").is_none());

        let parsed: Claims = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, claims);
    }

    #[test]
    fn missing_typ_defaults_to_access() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json.as_object_mut().unwrap().remove("typ");
        let parsed: Claims = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.kind, TokenKind::Access);
    }

    #[test]
    fn expiry_is_strict() {
        let claims = sample();
        assert!(!claims.is_expired_at(claims.expires_at));
        assert!(claims.is_expired_at(claims.expires_at + chrono::Duration::seconds(1)));
    }
}
