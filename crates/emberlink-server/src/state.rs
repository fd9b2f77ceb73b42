use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::ServerConfig;
use crate::room_manager::RoomManager;

/// The single lock over the room map. Broadcast enumeration, join/leave,
/// and the janitor all serialize through it.
pub type SharedRoomManager = Arc<RwLock<RoomManager>>;

#[derive(Clone)]
pub struct AppState {
    pub rooms: SharedRoomManager,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Build a fresh state from a config. Each call owns an independent
    /// room registry; tests can run servers side by side.
    pub fn new(config: ServerConfig) -> Self {
        let rooms = RoomManager::new(
            config.rooms.code_alphabet.clone(),
            config.rooms.code_length,
        );
        Self {
            rooms: Arc::new(RwLock::new(rooms)),
            config: Arc::new(config),
        }
    }
}
