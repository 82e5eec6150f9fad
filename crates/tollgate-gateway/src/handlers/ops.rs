//! Operational read endpoints over the connection hub.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use tollgate_core::UserId;

use crate::hub::HubStats;
use crate::state::GatewayState;

/// Response for `GET /online`.
#[derive(Debug, Serialize)]
pub struct OnlineResponse {
    /// Users with at least one live connection, sorted.
    pub users: Vec<UserId>,
}

/// `GET /stats`: live user and connection counts.
pub async fn stats(State(state): State<Arc<GatewayState>>) -> Json<HubStats> {
    Json(state.hub.stats())
}

/// `GET /online`: users with a live connection.
pub async fn online(State(state): State<Arc<GatewayState>>) -> Json<OnlineResponse> {
    Json(OnlineResponse {
        users: state.hub.online_users(),
    })
}
