use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    #[serde(rename = "roomId")]
    pub room_id: String,
}

/// POST /api/rooms — create an empty room and return its code.
pub async fn create_room(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreateRoomResponse>) {
    let code = {
        let mut rooms = state.rooms.write().await;
        rooms.create_room()
    };
    tracing::info!(room = %code, "Room created");
    (StatusCode::CREATED, Json(CreateRoomResponse { room_id: code }))
}

#[derive(Debug, Deserialize)]
pub struct JoinRoomBody {
    #[serde(rename = "clientId")]
    pub client_id: String,
}

#[derive(Debug, Serialize)]
pub struct JoinRoomResponse {
    pub peers: Vec<String>,
}

/// POST /api/rooms/{room_id}/join — the membership pre-check used before
/// a socket exists. Registers the id and returns the current peers; the
/// send handle arrives later with the `init` envelope.
pub async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<JoinRoomBody>,
) -> Result<Json<JoinRoomResponse>, AppError> {
    let client_id = body.client_id.trim();
    if client_id.is_empty() || client_id.len() > 64 || client_id.chars().any(char::is_control) {
        return Err(AppError::BadRequest("invalid client id".to_string()));
    }

    let mut rooms = state.rooms.write().await;
    let peers = rooms.join(&room_id, client_id, None)?;
    drop(rooms);

    tracing::info!(client_id, room = %room_id, "Client joined via API");
    Ok(Json(JoinRoomResponse { peers }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatusResponse {
    pub room_id: String,
    pub peer_count: usize,
    pub peers: Vec<String>,
    /// Unix milliseconds.
    pub created_at: u64,
}

/// GET /api/rooms/{room_id} — current peers and creation time.
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomStatusResponse>, AppError> {
    let rooms = state.rooms.read().await;
    let status = rooms
        .status(&room_id)
        .ok_or_else(|| AppError::NotFound(format!("room not found: {room_id}")))?;

    Ok(Json(RoomStatusResponse {
        peer_count: status.peers.len(),
        peers: status.peers,
        created_at: status.created_at_ms,
        room_id,
    }))
}
