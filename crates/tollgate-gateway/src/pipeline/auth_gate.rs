//! Authentication interceptor and the caller scope it produces.
//!
//! Unary calls go through the [`auth_gate`] middleware; socket handshakes call
//! [`AuthGate::authorize`] directly. Both share the same checks.

use std::collections::HashSet;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use tollgate_auth::{AuthError, Claims, TokenValidator};
use tollgate_core::{OrgId, UserId};

use crate::error::ApiError;

/// The authenticated caller of one call.
///
/// Handlers take it as an extractor argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallScope {
    /// The caller.
    #[serde(rename = "user_id")]
    pub subject: UserId,
    /// The caller's email.
    pub email: String,
    /// The caller's role.
    pub role: String,
    /// The organization the caller acts for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<OrgId>,
}

impl CallScope {
    /// Build a scope from validated claims.
    #[must_use]
    pub fn from_claims(claims: Claims) -> Self {
        Self {
            subject: claims.user_id,
            email: claims.email,
            role: claims.role,
            org_id: claims.org_id,
        }
    }

    /// Fail with `PermissionDenied` unless the caller has `role`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::PermissionDenied` on a role mismatch.
    pub fn require_role(&self, role: &str) -> Result<(), ApiError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ApiError::PermissionDenied(format!("requires role {role}")))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CallScope
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthenticated(AuthError::MissingCredential.to_string()))
    }
}

/// Authenticates calls against a token validator.
pub struct AuthGate {
    validator: Arc<dyn TokenValidator>,
    exempt: HashSet<String>,
}

impl AuthGate {
    /// Create a gate; calls to any of `exempt_methods` skip authentication.
    #[must_use]
    pub fn new(validator: Arc<dyn TokenValidator>, exempt_methods: &[String]) -> Self {
        Self {
            validator,
            exempt: exempt_methods.iter().cloned().collect(),
        }
    }

    /// Returns `true` if `method` skips authentication.
    #[must_use]
    pub fn is_exempt(&self, method: &str) -> bool {
        self.exempt.contains(method)
    }

    /// Decide whether a call to `method` presenting `token` may proceed.
    ///
    /// Returns `None` for exempt methods and the caller's scope otherwise.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthenticated` if the credential is missing,
    /// invalid or expired.
    pub fn authorize(&self, method: &str, token: Option<&str>) -> Result<Option<CallScope>, ApiError> {
        if self.is_exempt(method) {
            return Ok(None);
        }

        let token = token.ok_or(AuthError::MissingCredential)?;
        let claims = self.validator.validate(token).inspect_err(|e| {
            tracing::debug!(method, error = %e, "Rejected credential");
        })?;
        Ok(Some(CallScope::from_claims(claims)))
    }

    /// The subject of a valid credential, if any.
    ///
    /// Used where a caller must be identified without being required to
    /// authenticate.
    #[must_use]
    pub fn identify(&self, token: Option<&str>) -> Option<UserId> {
        token
            .and_then(|t| self.validator.validate(t).ok())
            .map(|claims| claims.user_id)
    }
}

/// Extract the bearer credential from the `authorization` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Extract the credential from the `token` query parameter.
#[must_use]
pub fn query_token(uri: &Uri) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

/// Middleware authenticating unary calls.
///
/// On success the scope is inserted into the request for the handler and
/// into the response for outer layers.
pub async fn auth_gate(State(gate): State<Arc<AuthGate>>, mut request: Request, next: Next) -> Response {
    let method = request.uri().path().to_owned();
    let token = bearer_token(request.headers()).map(str::to_owned);

    match gate.authorize(&method, token.as_deref()) {
        Ok(Some(scope)) => {
            request.extensions_mut().insert(scope.clone());
            let mut response = next.run(request).await;
            response.extensions_mut().insert(scope);
            response
        }
        Ok(None) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use tollgate_auth::{TokenConfig, TokenService};
    use tower::ServiceExt;

    use crate::error::Code;

    fn tokens() -> Arc<TokenService> {
        Arc::new(
            TokenService::new(&TokenConfig {
                secret: "auth-gate-test-secret".to_string(),
                ..TokenConfig::default()
            })
            .unwrap(),
        )
    }

    fn gate(tokens: &Arc<TokenService>) -> AuthGate {
        AuthGate::new(
            Arc::clone(tokens) as Arc<dyn TokenValidator>,
            &["/auth.AuthService/Login".to_string()],
        )
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn exempt_method_needs_no_credential() {
        let tokens = tokens();
        let gate = gate(&tokens);
        assert_eq!(gate.authorize("/auth.AuthService/Login", None).unwrap(), None);
    }

    #[test]
    fn missing_credential_is_unauthenticated() {
        let tokens = tokens();
        let err = gate(&tokens).authorize("/x.X/Y", None).unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }

    #[test]
    fn forged_credential_is_unauthenticated() {
        let tokens = tokens();
        let err = gate(&tokens)
            .authorize("/x.X/Y", Some("not.a.token"))
            .unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }

    #[test]
    fn refresh_credential_is_rejected() {
        let tokens = tokens();
        let refresh = tokens.issue_refresh(&user("U1")).unwrap();
        let err = gate(&tokens).authorize("/x.X/Y", Some(&refresh)).unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }

    #[test]
    fn valid_credential_yields_scope() {
        let tokens = tokens();
        let token = tokens
            .issue_access(&user("U1"), "u1@example.com", "member", None)
            .unwrap();
        let scope = gate(&tokens)
            .authorize("/x.X/Y", Some(&token))
            .unwrap()
            .unwrap();
        assert_eq!(scope.subject, user("U1"));
        assert_eq!(scope.email, "u1@example.com");
        assert_eq!(scope.role, "member");
        assert!(scope.require_role("member").is_ok());
        assert_eq!(
            scope.require_role("admin").unwrap_err().code(),
            Code::PermissionDenied
        );
    }

    #[test]
    fn identify_ignores_bad_credentials() {
        let tokens = tokens();
        let gate = gate(&tokens);
        let token = tokens.issue_access(&user("U7"), "", "member", None).unwrap();
        assert_eq!(gate.identify(Some(&token)), Some(user("U7")));
        assert_eq!(gate.identify(Some("garbage")), None);
        assert_eq!(gate.identify(None), None);
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn query_parameter_parsing() {
        let uri: Uri = "/ws?token=abc.def&x=1".parse().unwrap();
        assert_eq!(query_token(&uri).as_deref(), Some("abc.def"));

        let uri: Uri = "/ws".parse().unwrap();
        assert_eq!(query_token(&uri), None);

        let uri: Uri = "/ws?token=".parse().unwrap();
        assert_eq!(query_token(&uri), None);
    }

    #[tokio::test]
    async fn middleware_blocks_before_handler() {
        let tokens = tokens();
        let gate = Arc::new(gate(&tokens));
        let app = Router::new()
            .route("/x.X/Y", post(|scope: CallScope| async move { scope.subject.to_string() }))
            .layer(axum::middleware::from_fn_with_state(gate, auth_gate));

        let response = app
            .clone()
            .oneshot(
                Request::post("/x.X/Y")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let token = tokens.issue_access(&user("U1"), "", "member", None).unwrap();
        let response = app
            .oneshot(
                Request::post("/x.X/Y")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.extensions().get::<CallScope>().unwrap().subject,
            user("U1")
        );
    }
}
