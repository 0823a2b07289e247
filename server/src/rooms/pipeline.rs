//! Message pipeline: validate, persist, then fan out with a per-recipient `isOwn`.

use chrono::Utc;
use uuid::Uuid;

use crate::db::models::RoomMessage;
use crate::error::RoomError;
use crate::rooms::store;
use crate::state::AppState;
use crate::ws::gateway::ConnectionState;
use crate::ws::protocol::ServerEvent;

/// Upper bound on message length, in characters after trimming.
pub const MAX_CONTENT_LENGTH: usize = 500;

/// Trim and bound-check message content.
pub fn validate_content(content: &str) -> Result<&str, RoomError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(RoomError::EmptyContent);
    }
    if trimmed.chars().count() > MAX_CONTENT_LENGTH {
        return Err(RoomError::ContentTooLong);
    }
    Ok(trimmed)
}

/// Send `content` from `conn` into `room_id`.
///
/// The counter bump and the insert share one transaction, and the broadcast is queued
/// before the room guard is released, so members see messages in persistence order.
/// A failed write broadcasts nothing.
pub async fn send_message(
    state: &AppState,
    conn: &ConnectionState,
    room_id: &str,
    content: &str,
) -> Result<RoomMessage, RoomError> {
    let anonymous_id = match conn.binding() {
        Some(binding) if binding.room_id == room_id => binding.anonymous_id.clone(),
        _ => return Err(RoomError::NotJoined),
    };
    let content = validate_content(content)?.to_string();

    let guard = state.sequencer.acquire(room_id).await;

    let message = RoomMessage {
        id: Uuid::now_v7().to_string(),
        room_id: room_id.to_string(),
        user_id: conn.user_id.clone(),
        anonymous_id,
        content,
        created_at: Utc::now(),
    };

    let db = state.db.clone();
    let record = message.clone();
    tokio::task::spawn_blocking(move || -> Result<(), RoomError> {
        let mut db_conn = db.lock()?;
        let tx = db_conn.transaction()?;
        if !store::increment_message_count(&tx, &record.room_id)? {
            return Err(RoomError::RoomNotFound);
        }
        store::insert_message(&tx, &record)?;
        tx.commit()?;
        Ok(())
    })
    .await??;

    let author = conn.conn_id;
    state.channels.broadcast_with(room_id, |recipient| {
        ServerEvent::new_message(&message, recipient == author)
    });

    drop(guard);

    tracing::debug!(
        room_id = %room_id,
        user_id = %conn.user_id,
        message_id = %message.id,
        "Message sent"
    );

    Ok(message)
}
