use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Live rooms.
    pub rooms: usize,
    /// Members with a connected socket.
    pub connections: usize,
}

/// GET /healthz — server status plus room and connection counts.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (rooms, connections) = {
        let rooms = state.rooms.read().await;
        rooms.stats()
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        rooms,
        connections,
    })
}
