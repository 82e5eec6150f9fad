//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, ops, rpc, ws};
use crate::pipeline::{auth_gate, rate_limit, request_log};
use crate::state::GatewayState;

/// Method path of the caller-introspection RPC.
pub const WHO_AM_I: &str = "/gateway.GatewayService/WhoAmI";
/// Method path of the notification publish RPC.
pub const PUBLISH: &str = "/notification.NotificationService/Publish";

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /stats` - Live user and connection counts
/// - `GET /online` - Users with a live connection
///
/// ## RPC (logged, rate limited, authenticated)
/// - `POST /gateway.GatewayService/WhoAmI` - The caller's scope
/// - `POST /notification.NotificationService/Publish` - Publish a notification (admin)
///
/// ## Streaming (logged, rate limited, authenticated at handshake)
/// - `GET /ws` - Notification socket
pub fn create_router(state: Arc<GatewayState>) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    // Layers added last run first.
    let rpc = Router::new()
        .route(WHO_AM_I, post(rpc::who_am_i))
        .route(PUBLISH, post(rpc::publish))
        .layer(from_fn_with_state(Arc::clone(&state.auth_gate), auth_gate))
        .layer(from_fn_with_state(Arc::clone(&state), rate_limit))
        .layer(from_fn(request_log));

    let streaming = Router::new()
        .route("/ws", get(ws::websocket_handler))
        .layer(from_fn_with_state(Arc::clone(&state), rate_limit))
        .layer(from_fn(request_log));

    Router::new()
        .route("/health", get(health::health))
        .route("/stats", get(ops::stats))
        .route("/online", get(ops::online))
        .merge(rpc)
        .merge(streaming)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
