//! Per-room anonymous handles.
//!
//! A handle maps (room, real user) to a short token that is stable for the lifetime of
//! the room and carries no linkage across rooms.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::db::models::{HistoryEntry, Room};

pub const HANDLE_PREFIX: &str = "user_";
pub const HANDLE_SUFFIX_LEN: usize = 4;
const HANDLE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a fresh handle such as `user_AB12`.
pub fn generate_anonymous_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..HANDLE_SUFFIX_LEN)
        .map(|_| HANDLE_ALPHABET[rng.random_range(0..HANDLE_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", HANDLE_PREFIX, suffix)
}

/// Return the handle `user_id` holds in `room`, assigning one on first encounter.
///
/// A new assignment is appended to the room's history in memory only. It counts as
/// assigned once the caller persists the room; a failed save discards it.
pub fn resolve_handle(room: &mut Room, user_id: &str, now: DateTime<Utc>) -> String {
    if let Some(entry) = room.history_entry(user_id) {
        return entry.anonymous_id.clone();
    }

    // Regenerate until the handle is unused in this room's history
    let anonymous_id = loop {
        let candidate = generate_anonymous_id();
        if !room
            .participant_history
            .iter()
            .any(|h| h.anonymous_id == candidate)
        {
            break candidate;
        }
    };

    room.participant_history.push(HistoryEntry {
        user_id: user_id.to_string(),
        anonymous_id: anonymous_id.clone(),
        first_joined_at: now,
    });

    anonymous_id
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::models::{ResetInterval, RoomCategory, RoomKind};
    use std::collections::HashSet;

    pub(crate) fn empty_room(max_participants: u32) -> Room {
        let now = Utc::now();
        Room {
            id: "room-1".to_string(),
            name: "General".to_string(),
            description: None,
            category: RoomCategory::Discussion,
            reset_interval: ResetInterval::Day,
            max_participants,
            participant_count: 0,
            message_count: 0,
            room_type: RoomKind::Official,
            created_by: None,
            next_reset_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
            active_participants: Vec::new(),
            participant_history: Vec::new(),
        }
    }

    #[test]
    fn test_generated_handle_shape() {
        for _ in 0..100 {
            let handle = generate_anonymous_id();
            let suffix = handle.strip_prefix(HANDLE_PREFIX).unwrap();
            assert_eq!(suffix.len(), HANDLE_SUFFIX_LEN);
            assert!(suffix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_handle_is_stable_for_known_user() {
        let mut room = empty_room(100);
        let first = resolve_handle(&mut room, "u1", Utc::now());
        let second = resolve_handle(&mut room, "u1", Utc::now());
        assert_eq!(first, second);
        assert_eq!(room.participant_history.len(), 1);
    }

    #[test]
    fn test_distinct_users_get_distinct_handles() {
        let mut room = empty_room(1000);
        let mut seen = HashSet::new();
        for i in 0..500 {
            let handle = resolve_handle(&mut room, &format!("u{}", i), Utc::now());
            assert!(seen.insert(handle), "handle reused within one room");
        }
    }

    #[test]
    fn test_history_lookup_wins_over_generation() {
        let mut room = empty_room(100);
        room.participant_history.push(HistoryEntry {
            user_id: "u1".to_string(),
            anonymous_id: "user_ZZ99".to_string(),
            first_joined_at: Utc::now(),
        });
        assert_eq!(resolve_handle(&mut room, "u1", Utc::now()), "user_ZZ99");
    }
}
