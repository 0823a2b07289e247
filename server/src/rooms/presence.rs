//! Live presence per room.
//!
//! The active participant list and the participant history are only ever written
//! through this module, and only while the caller holds the room's sequencer guard.

use chrono::{DateTime, Utc};

use crate::db::models::{ActiveParticipant, Room};
use crate::db::DbPool;
use crate::error::RoomError;
use crate::rooms::identity;
use crate::rooms::sequencer::RoomGuard;
use crate::rooms::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// The user was not active; others should hear about it.
    New,
    /// The user was already active (reconnect, refresh). Nothing changed.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub anonymous_id: String,
    pub participant_count: u32,
    pub kind: JoinKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub anonymous_id: String,
    pub participant_count: u32,
}

/// Apply a join to an in-memory room.
pub fn apply_join(
    room: &mut Room,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<JoinOutcome, RoomError> {
    if let Some(active) = room.active_participant(user_id) {
        return Ok(JoinOutcome {
            anonymous_id: active.anonymous_id.clone(),
            participant_count: room.participant_count,
            kind: JoinKind::Duplicate,
        });
    }

    if room.is_full() {
        return Err(RoomError::RoomFull);
    }

    let anonymous_id = identity::resolve_handle(room, user_id, now);
    room.active_participants.push(ActiveParticipant {
        user_id: user_id.to_string(),
        anonymous_id: anonymous_id.clone(),
        joined_at: now,
    });
    room.participant_count = room.active_participants.len() as u32;

    Ok(JoinOutcome {
        anonymous_id,
        participant_count: room.participant_count,
        kind: JoinKind::New,
    })
}

/// Apply a leave to an in-memory room. `None` when the user was not active.
pub fn apply_leave(room: &mut Room, user_id: &str) -> Option<LeaveOutcome> {
    let index = room
        .active_participants
        .iter()
        .position(|p| p.user_id == user_id)?;
    let removed = room.active_participants.remove(index);
    room.participant_count = room.active_participants.len() as u32;

    Some(LeaveOutcome {
        anonymous_id: removed.anonymous_id,
        participant_count: room.participant_count,
    })
}

/// Join `user_id` to the guarded room and persist the result.
///
/// A new join writes the history append, the active-list append and the count in one
/// transaction. If that write fails the join fails and no handle is handed out.
pub async fn join(db: &DbPool, guard: &RoomGuard, user_id: &str) -> Result<JoinOutcome, RoomError> {
    let db = db.clone();
    let room_id = guard.room_id().to_string();
    let user_id = user_id.to_string();

    tokio::task::spawn_blocking(move || -> Result<JoinOutcome, RoomError> {
        let mut conn = db.lock()?;
        let mut room = store::load_room(&conn, &room_id)?.ok_or(RoomError::RoomNotFound)?;

        let outcome = apply_join(&mut room, &user_id, Utc::now())?;
        if outcome.kind == JoinKind::New {
            let tx = conn.transaction()?;
            store::save_presence(&tx, &room)?;
            tx.commit()?;
        }
        Ok(outcome)
    })
    .await?
}

/// Remove `user_id` from the guarded room's active list.
///
/// Leaving a room the user is not active in, or a room that no longer exists, is a
/// no-op and returns `None`.
pub async fn leave(
    db: &DbPool,
    guard: &RoomGuard,
    user_id: &str,
) -> Result<Option<LeaveOutcome>, RoomError> {
    let db = db.clone();
    let room_id = guard.room_id().to_string();
    let user_id = user_id.to_string();

    tokio::task::spawn_blocking(move || -> Result<Option<LeaveOutcome>, RoomError> {
        let mut conn = db.lock()?;
        let Some(mut room) = store::load_room(&conn, &room_id)? else {
            return Ok(None);
        };

        let outcome = apply_leave(&mut room, &user_id);
        if outcome.is_some() {
            let tx = conn.transaction()?;
            store::save_presence(&tx, &room)?;
            tx.commit()?;
        }
        Ok(outcome)
    })
    .await?
}
