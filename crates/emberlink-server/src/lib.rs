pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod rate_limit;
pub mod room_manager;
pub mod router;
pub mod state;
pub mod ws;

use std::time::Duration;

use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let state = AppState::new(config);

    let api_routes = Router::new()
        .route("/rooms", axum::routing::post(api::create_room))
        .route("/rooms/{room_id}/join", axum::routing::post(api::join_room))
        .route("/rooms/{room_id}", axum::routing::get(api::get_room));

    let app = Router::new()
        .route("/ws", axum::routing::get(ws::ws_handler))
        .route("/healthz", axum::routing::get(health::health_check))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (app, state)
}

/// Spawn the janitor: a fixed-interval sweep that evicts rooms idle past
/// the TTL and closes their members' connections. The task is owned by
/// the caller through the returned handle and stops when `shutdown` is
/// cancelled.
pub fn spawn_janitor(state: AppState, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ttl = Duration::from_secs(state.config.rooms.idle_ttl_secs);
        let sweep = Duration::from_secs(state.config.rooms.sweep_interval_secs);
        let mut interval = tokio::time::interval(sweep);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let removed = {
                        let mut rooms = state.rooms.write().await;
                        rooms.sweep_idle(ttl)
                    };
                    if removed > 0 {
                        tracing::info!(removed, "Janitor evicted idle rooms");
                    }
                },
            }
        }
        tracing::debug!("Janitor stopped");
    })
}
