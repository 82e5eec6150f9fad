//! Admission control interceptor.
//!
//! Sits outside the auth gate, so it identifies the caller itself: a valid
//! credential, from the `authorization` header or the `token` query
//! parameter, selects the subject's bucket. Anything else uses the method's.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::pipeline::auth_gate::{bearer_token, query_token};
use crate::state::GatewayState;

/// Middleware rejecting calls whose bucket is empty.
pub async fn rate_limit(State(state): State<Arc<GatewayState>>, request: Request, next: Next) -> Response {
    let method = request.uri().path();
    let token = bearer_token(request.headers())
        .map(str::to_owned)
        .or_else(|| query_token(request.uri()));
    let key = state
        .auth_gate
        .identify(token.as_deref())
        .map_or_else(|| method.to_owned(), |subject| subject.to_string());

    if state.limiter.admit(&key) {
        return next.run(request).await;
    }

    metrics::counter!("tollgate_rate_limited_total", "method" => method.to_owned()).increment(1);
    tracing::debug!(method, key = %key, "Rate limit exceeded");
    ApiError::RateLimited.into_response()
}
