//! Publish endpoints: push a server event to a room or to everyone.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use hubbub_shared::{RoomKey, ServerEvent};
use serde::Serialize;

use super::Problem;
use crate::state::{AppState, Relay};

#[derive(Debug, Serialize)]
pub struct PublishReceipt {
    /// Connections the event was handed to.
    pub receivers: usize,
}

/// Publish an event to every connection joined to `room` (`{kind}:{id}`).
pub async fn publish_to_room(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Json(event): Json<ServerEvent>,
) -> Result<(StatusCode, Json<PublishReceipt>), Problem> {
    let room = RoomKey::parse(&room)?;
    let name = event.name();
    let receivers = state.publish(&room, Relay::from_server(event)).await;
    tracing::info!("Published {} to {} ({} receivers)", name, room, receivers);

    Ok((StatusCode::ACCEPTED, Json(PublishReceipt { receivers })))
}

/// Publish an event to every authenticated connection.
pub async fn publish_to_all(
    State(state): State<AppState>,
    Json(event): Json<ServerEvent>,
) -> (StatusCode, Json<PublishReceipt>) {
    let name = event.name();
    let receivers = state.broadcast(Relay::from_server(event));
    tracing::info!("Broadcast {} ({} receivers)", name, receivers);

    (StatusCode::ACCEPTED, Json(PublishReceipt { receivers }))
}
