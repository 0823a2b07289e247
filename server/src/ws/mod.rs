pub mod actor;
pub mod gateway;
pub mod handler;
pub mod protocol;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Server-assigned id of one live connection.
pub type ConnectionId = Uuid;

/// Live connections per user. A user can have several (multiple devices/tabs).
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<String, Vec<ConnectionId>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: &str, conn_id: ConnectionId) {
        let mut entry = self.inner.entry(user_id.to_string()).or_default();
        entry.push(conn_id);
        tracing::debug!(
            user_id = %user_id,
            conn_id = %conn_id,
            connections = entry.len(),
            "Connection registered"
        );
    }

    pub fn unregister(&self, user_id: &str, conn_id: ConnectionId) {
        let mut remove_user = false;
        if let Some(mut connections) = self.inner.get_mut(user_id) {
            connections.retain(|id| *id != conn_id);
            remove_user = connections.is_empty();
        }
        if remove_user {
            self.inner.remove_if(user_id, |_, v| v.is_empty());
        }
        tracing::debug!(user_id = %user_id, conn_id = %conn_id, "Connection unregistered");
    }

    /// Number of live connections for one user.
    pub fn user_connections(&self, user_id: &str) -> usize {
        self.inner.get(user_id).map(|v| v.len()).unwrap_or(0)
    }

    /// Total live connections across all users.
    pub fn total(&self) -> usize {
        self.inner.iter().map(|entry| entry.value().len()).sum()
    }
}
