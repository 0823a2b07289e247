use crate::db::DbPool;
use crate::rooms::channel::RoomChannel;
use crate::rooms::sequencer::RoomSequencer;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Active WebSocket connections per user
    pub connections: ConnectionRegistry,
    /// Live broadcast group per room
    pub channels: RoomChannel,
    /// Per-room serialization point for presence and message writes
    pub sequencer: RoomSequencer,
}

impl AppState {
    pub fn new(db: DbPool, jwt_secret: Vec<u8>) -> Self {
        Self {
            db,
            jwt_secret,
            connections: ConnectionRegistry::new(),
            channels: RoomChannel::new(),
            sequencer: RoomSequencer::new(),
        }
    }
}
