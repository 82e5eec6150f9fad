//! Built-in RPC handlers.
//!
//! Both run behind the full call pipeline, so a [`CallScope`] is always
//! present.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use tollgate_broker::Target;
use tollgate_core::UserId;

use crate::error::ApiError;
use crate::pipeline::CallScope;
use crate::state::GatewayState;

/// Role allowed to publish notifications.
pub const PUBLISHER_ROLE: &str = "admin";

/// `/gateway.GatewayService/WhoAmI`: the caller's own scope.
pub async fn who_am_i(scope: CallScope) -> Json<CallScope> {
    Json(scope)
}

/// Request body for `/notification.NotificationService/Publish`.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    /// Recipient user; exclusive with `broadcast`.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Deliver to every live connection.
    #[serde(default)]
    pub broadcast: bool,
    /// Notification type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form payload fields.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl PublishRequest {
    fn target(&self) -> Result<Target, ApiError> {
        match (&self.user_id, self.broadcast) {
            (Some(user), false) => UserId::new(user.as_str())
                .map(Target::User)
                .map_err(|e| ApiError::BadRequest(format!("invalid user_id: {e}"))),
            (None, true) => Ok(Target::Broadcast),
            _ => Err(ApiError::BadRequest(
                "exactly one of user_id or broadcast is required".to_string(),
            )),
        }
    }
}

/// Response for `/notification.NotificationService/Publish`.
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    /// Id of the appended entry.
    pub id: String,
}

/// `/notification.NotificationService/Publish`: append a notification to
/// the configured stream.
///
/// # Errors
///
/// Returns `PermissionDenied` for non-admin callers, `BadRequest` for a
/// malformed request, or `Unavailable` if the stream cannot be written.
pub async fn publish(
    State(state): State<Arc<GatewayState>>,
    scope: CallScope,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    scope.require_role(PUBLISHER_ROLE)?;

    let target = request.target()?;
    if request.kind.is_empty() {
        return Err(ApiError::BadRequest("type must not be empty".to_string()));
    }

    let id = state.broker.publish_notification(
        &state.config.consumer.stream,
        &target,
        &request.kind,
        request.fields,
    )?;

    tracing::info!(
        publisher = %scope.subject,
        kind = %request.kind,
        id = %id,
        "Notification published"
    );
    Ok(Json(PublishResponse { id: id.to_string() }))
}
