//! JSON wire format for the realtime room surface.
//!
//! Every frame is a text frame shaped `{"event": <name>, "data": <payload>}`.

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::RoomMessage;

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinRoom(JoinRoomPayload),
    SendMessage(SendMessagePayload),
    LeaveRoom(LeaveTarget),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub room_id: String,
    pub content: String,
}

/// `leaveRoom` carries a bare room id; `{roomId}` is accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LeaveTarget {
    Id(String),
    #[serde(rename_all = "camelCase")]
    Object { room_id: String },
}

impl LeaveTarget {
    pub fn room_id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Object { room_id } => room_id,
        }
    }
}

/// Events the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    JoinedRoom(JoinedRoomPayload),
    UserJoined(PresencePayload),
    UserLeft(PresencePayload),
    NewMessage(NewMessagePayload),
    RoomDeleted(RoomDeletedPayload),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedRoomPayload {
    pub room_id: String,
    pub anonymous_id: String,
    pub participant_count: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub anonymous_id: String,
    pub participant_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessagePayload {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    pub anonymous_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_own: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDeletedPayload {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl ServerEvent {
    pub fn joined_room(room_id: &str, anonymous_id: &str, participant_count: u32) -> Self {
        Self::JoinedRoom(JoinedRoomPayload {
            room_id: room_id.to_string(),
            anonymous_id: anonymous_id.to_string(),
            participant_count,
            message: "Successfully joined room".to_string(),
        })
    }

    pub fn user_joined(anonymous_id: &str, participant_count: u32) -> Self {
        Self::UserJoined(PresencePayload {
            anonymous_id: anonymous_id.to_string(),
            participant_count,
        })
    }

    pub fn user_left(anonymous_id: &str, participant_count: u32) -> Self {
        Self::UserLeft(PresencePayload {
            anonymous_id: anonymous_id.to_string(),
            participant_count,
        })
    }

    /// Project a stored message for one recipient.
    pub fn new_message(message: &RoomMessage, is_own: bool) -> Self {
        Self::NewMessage(NewMessagePayload {
            id: message.id.clone(),
            content: message.content.clone(),
            anonymous_id: message.anonymous_id.clone(),
            timestamp: message.created_at,
            is_own,
        })
    }

    pub fn room_deleted(room_id: &str) -> Self {
        Self::RoomDeleted(RoomDeletedPayload {
            room_id: room_id.to_string(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Encode as a WebSocket text frame.
    pub fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode server event");
                None
            }
        }
    }
}

/// Decode a client text frame.
pub fn decode(text: &str) -> Result<ClientEvent, serde_json::Error> {
    serde_json::from_str(text)
}
