//! Persistence primitives for room and message records.
//!
//! All functions are synchronous and take a borrowed connection (or transaction);
//! callers run them inside `spawn_blocking` while holding the DB lock.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{
    ActiveParticipant, HistoryEntry, ResetInterval, Room, RoomCategory, RoomKind, RoomMessage,
};
use crate::db::{format_timestamp, parse_timestamp};

const ROOM_COLUMNS: &str = "id, name, description, category, reset_interval, max_participants,
     participant_count, message_count, room_type, created_by, next_reset_at, expires_at,
     created_at, updated_at";

fn conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn parse_optional_timestamp(value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

/// Map a `rooms` row (selected with ROOM_COLUMNS) without its presence lists.
fn room_from_row(row: &Row<'_>) -> rusqlite::Result<Room> {
    let category: String = row.get(3)?;
    let reset_interval: u32 = row.get(4)?;
    let room_type: String = row.get(8)?;

    Ok(Room {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        category: RoomCategory::from_str(&category)
            .ok_or_else(|| conversion_error(format!("unknown category {}", category)))?,
        reset_interval: ResetInterval::try_from(reset_interval).map_err(conversion_error)?,
        max_participants: row.get(5)?,
        participant_count: row.get(6)?,
        message_count: row.get::<_, i64>(7)? as u64,
        room_type: RoomKind::from_str(&room_type)
            .ok_or_else(|| conversion_error(format!("unknown room type {}", room_type)))?,
        created_by: row.get(9)?,
        next_reset_at: parse_optional_timestamp(row.get(10)?)?,
        expires_at: parse_optional_timestamp(row.get(11)?)?,
        created_at: parse_timestamp(&row.get::<_, String>(12)?)?,
        updated_at: parse_timestamp(&row.get::<_, String>(13)?)?,
        active_participants: Vec::new(),
        participant_history: Vec::new(),
    })
}

fn load_presence(conn: &Connection, room: &mut Room) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT user_id, anonymous_id, joined_at FROM room_active_participants
         WHERE room_id = ?1 ORDER BY rowid ASC",
    )?;
    room.active_participants = stmt
        .query_map([&room.id], |row| {
            Ok(ActiveParticipant {
                user_id: row.get(0)?,
                anonymous_id: row.get(1)?,
                joined_at: parse_timestamp(&row.get::<_, String>(2)?)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT user_id, anonymous_id, first_joined_at FROM room_participant_history
         WHERE room_id = ?1 ORDER BY first_joined_at ASC, rowid ASC",
    )?;
    room.participant_history = stmt
        .query_map([&room.id], |row| {
            Ok(HistoryEntry {
                user_id: row.get(0)?,
                anonymous_id: row.get(1)?,
                first_joined_at: parse_timestamp(&row.get::<_, String>(2)?)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(())
}

/// Fetch a room together with its active participants and history.
pub fn load_room(conn: &Connection, room_id: &str) -> rusqlite::Result<Option<Room>> {
    let room = conn
        .query_row(
            &format!("SELECT {} FROM rooms WHERE id = ?1", ROOM_COLUMNS),
            [room_id],
            room_from_row,
        )
        .optional()?;

    match room {
        Some(mut room) => {
            load_presence(conn, &mut room)?;
            Ok(Some(room))
        }
        None => Ok(None),
    }
}

/// List rooms newest first, optionally filtered by category. Presence lists are loaded
/// so callers can render the anonymous roster.
pub fn list_rooms(conn: &Connection, category: Option<RoomCategory>) -> rusqlite::Result<Vec<Room>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM rooms WHERE (?1 IS NULL OR category = ?1) ORDER BY created_at DESC, rowid DESC",
        ROOM_COLUMNS
    ))?;
    let mut rooms = stmt
        .query_map([category.map(|c| c.as_str())], room_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for room in &mut rooms {
        load_presence(conn, room)?;
    }
    Ok(rooms)
}

pub fn insert_room(conn: &Connection, room: &Room) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO rooms (id, name, description, category, reset_interval, max_participants,
             participant_count, message_count, room_type, created_by, next_reset_at, expires_at,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            room.id,
            room.name,
            room.description,
            room.category.as_str(),
            room.reset_interval.hours(),
            room.max_participants,
            room.participant_count,
            room.message_count as i64,
            room.room_type.as_str(),
            room.created_by,
            room.next_reset_at.map(format_timestamp),
            room.expires_at.map(format_timestamp),
            format_timestamp(room.created_at),
            format_timestamp(room.updated_at),
        ],
    )?;
    Ok(())
}

/// Persist the editable metadata fields of a room.
pub fn update_room_metadata(conn: &Connection, room: &Room) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE rooms SET name = ?2, description = ?3, category = ?4, reset_interval = ?5,
             max_participants = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            room.id,
            room.name,
            room.description,
            room.category.as_str(),
            room.reset_interval.hours(),
            room.max_participants,
            format_timestamp(room.updated_at),
        ],
    )?;
    Ok(())
}

/// Write a room's presence state: the cached participant count, the full active list
/// (in order) and any history entries not yet stored. Call inside a transaction so the
/// history append and active-list change land together.
pub fn save_presence(conn: &Connection, room: &Room) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE rooms SET participant_count = ?2 WHERE id = ?1",
        params![room.id, room.participant_count],
    )?;

    conn.execute(
        "DELETE FROM room_active_participants WHERE room_id = ?1",
        [&room.id],
    )?;
    for participant in &room.active_participants {
        conn.execute(
            "INSERT INTO room_active_participants (room_id, user_id, anonymous_id, joined_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                room.id,
                participant.user_id,
                participant.anonymous_id,
                format_timestamp(participant.joined_at),
            ],
        )?;
    }

    // History is append-only: existing rows are never rewritten
    for entry in &room.participant_history {
        conn.execute(
            "INSERT OR IGNORE INTO room_participant_history (room_id, user_id, anonymous_id, first_joined_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                room.id,
                entry.user_id,
                entry.anonymous_id,
                format_timestamp(entry.first_joined_at),
            ],
        )?;
    }

    Ok(())
}

/// Clear every room's live presence. Run at startup: no connection survives a restart.
/// Returns the number of participant rows removed.
pub fn reset_all_presence(conn: &Connection) -> rusqlite::Result<usize> {
    let removed = conn.execute("DELETE FROM room_active_participants", [])?;
    conn.execute("UPDATE rooms SET participant_count = 0", [])?;
    Ok(removed)
}

/// Bump the cached message counter. Returns false if the room no longer exists.
pub fn increment_message_count(conn: &Connection, room_id: &str) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE rooms SET message_count = message_count + 1 WHERE id = ?1",
        [room_id],
    )?;
    Ok(updated > 0)
}

pub fn insert_message(conn: &Connection, message: &RoomMessage) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO room_messages (id, room_id, user_id, anonymous_id, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            message.id,
            message.room_id,
            message.user_id,
            message.anonymous_id,
            message.content,
            format_timestamp(message.created_at),
        ],
    )?;
    Ok(())
}

/// Page through a room's messages in ascending creation order.
pub fn list_messages(
    conn: &Connection,
    room_id: &str,
    offset: u64,
    limit: u32,
) -> rusqlite::Result<Vec<RoomMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, room_id, user_id, anonymous_id, content, created_at FROM room_messages
         WHERE room_id = ?1
         ORDER BY created_at ASC, rowid ASC
         LIMIT ?2 OFFSET ?3",
    )?;
    let messages = stmt
        .query_map(params![room_id, limit as i64, offset as i64], |row| {
            Ok(RoomMessage {
                id: row.get(0)?,
                room_id: row.get(1)?,
                user_id: row.get(2)?,
                anonymous_id: row.get(3)?,
                content: row.get(4)?,
                created_at: parse_timestamp(&row.get::<_, String>(5)?)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(messages)
}

pub fn count_messages(conn: &Connection, room_id: &str) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM room_messages WHERE room_id = ?1",
        [room_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Delete a room and everything that hangs off it. Returns false if no room matched.
pub fn delete_room(conn: &Connection, room_id: &str) -> rusqlite::Result<bool> {
    conn.execute("DELETE FROM room_messages WHERE room_id = ?1", [room_id])?;
    conn.execute(
        "DELETE FROM room_active_participants WHERE room_id = ?1",
        [room_id],
    )?;
    conn.execute(
        "DELETE FROM room_participant_history WHERE room_id = ?1",
        [room_id],
    )?;
    let deleted = conn.execute("DELETE FROM rooms WHERE id = ?1", [room_id])?;
    Ok(deleted > 0)
}

pub fn count_official_rooms(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM rooms WHERE room_type = 'official'",
        [],
        |row| row.get(0),
    )
}
