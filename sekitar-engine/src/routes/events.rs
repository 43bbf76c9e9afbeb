use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use sekitar_shared::types::event::{payloads::UserEventReceived, routing_keys, Event};
use sekitar_shared::{ApiResponse, AppError, AppResult};

use crate::chat::handlers;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub event_id: uuid::Uuid,
}

/// POST /events — same envelope the gateway publishes on the bus.
pub async fn receive_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<Event<UserEventReceived>>,
) -> AppResult<Json<ApiResponse<Accepted>>> {
    if event.event_type != routing_keys::TRANSPORT_EVENT_RECEIVED {
        return Err(AppError::bad_request(format!(
            "unsupported event type '{}'",
            event.event_type
        )));
    }
    if event.data.user_id.trim().is_empty() {
        return Err(AppError::validation("user_id is required"));
    }

    tracing::debug!(event_id = %event.id, user_id = %event.data.user_id, "received user event over http");
    handlers::handle_event(&state, event.data).await;

    Ok(Json(ApiResponse::ok(Accepted { event_id: event.id })))
}
