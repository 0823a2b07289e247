//! Error taxonomy for room operations.
//!
//! The same enum backs the realtime surface (converted to an `error` event for the
//! originating connection) and the HTTP room endpoints (converted to a status code).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::rooms::pipeline::MAX_CONTENT_LENGTH;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("You must join a room first")]
    NotJoined,

    #[error("Leave your current room before joining another")]
    AlreadyInRoom,

    #[error("Room is full")]
    RoomFull,

    #[error("Message cannot be empty")]
    EmptyContent,

    #[error("Message cannot exceed {} characters", MAX_CONTENT_LENGTH)]
    ContentTooLong,

    #[error("You do not have permission to modify this room")]
    Forbidden,

    #[error("{0}")]
    InvalidRoom(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl RoomError {
    /// Text safe to show to a client. Persistence failures collapse to `fallback`
    /// so no storage detail leaks out.
    pub fn client_message(&self, fallback: &str) -> String {
        match self {
            Self::Persistence(_) => fallback.to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RoomNotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ContentTooLong => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RoomFull | Self::AlreadyInRoom => StatusCode::CONFLICT,
            Self::NotJoined | Self::EmptyContent | Self::InvalidRoom(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<rusqlite::Error> for RoomError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<tokio::task::JoinError> for RoomError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Persistence(format!("blocking task failed: {}", err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for RoomError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Persistence(format!("DB lock error: {}", err))
    }
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_persistence() {
            tracing::error!(error = %self, "Room request failed");
        }
        let message = self.client_message("Internal server error");
        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}
