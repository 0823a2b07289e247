use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::db::models::{ResetInterval, Room, RoomCategory, RoomKind};
use crate::rooms::store;

struct OfficialRoom {
    name: &'static str,
    description: &'static str,
    category: RoomCategory,
    reset_interval: ResetInterval,
    max_participants: u32,
}

const OFFICIAL_ROOMS: &[OfficialRoom] = &[
    OfficialRoom {
        name: "Safe Space",
        description: "A judgment-free zone for sharing struggles and supporting each other",
        category: RoomCategory::Support,
        reset_interval: ResetInterval::Day,
        max_participants: 100,
    },
    OfficialRoom {
        name: "Career Advice",
        description: "Get anonymous career guidance and professional development tips",
        category: RoomCategory::Professional,
        reset_interval: ResetInterval::ThreeDays,
        max_participants: 150,
    },
    OfficialRoom {
        name: "Creative Corner",
        description: "Share your art, writing, and creative projects anonymously",
        category: RoomCategory::Creative,
        reset_interval: ResetInterval::Week,
        max_participants: 200,
    },
    OfficialRoom {
        name: "Relationship Talk",
        description: "Discuss relationships, dating, and connections anonymously",
        category: RoomCategory::Relationships,
        reset_interval: ResetInterval::Day,
        max_participants: 100,
    },
    OfficialRoom {
        name: "Tech Hub",
        description: "Discuss technology, programming, and digital innovation",
        category: RoomCategory::Technology,
        reset_interval: ResetInterval::ThreeDays,
        max_participants: 150,
    },
    OfficialRoom {
        name: "Random Thoughts",
        description: "Share your random thoughts and have casual conversations",
        category: RoomCategory::Discussion,
        reset_interval: ResetInterval::Day,
        max_participants: 200,
    },
    OfficialRoom {
        name: "Mental Health",
        description: "A supportive space for mental health discussions and peer support",
        category: RoomCategory::Support,
        reset_interval: ResetInterval::Day,
        max_participants: 100,
    },
    OfficialRoom {
        name: "Study Group",
        description: "Anonymous study sessions and academic support",
        category: RoomCategory::Professional,
        reset_interval: ResetInterval::ThreeDays,
        max_participants: 150,
    },
];

/// Seed the official rooms.
/// Only seeds if no official room exists yet (idempotent guard).
/// Returns the number of rooms inserted.
pub fn seed_official_rooms(conn: &mut rusqlite::Connection) -> Result<usize, rusqlite::Error> {
    if store::count_official_rooms(conn)? > 0 {
        return Ok(0);
    }

    let now = Utc::now();
    let tx = conn.transaction()?;
    for official in OFFICIAL_ROOMS {
        let room = Room {
            id: Uuid::now_v7().to_string(),
            name: official.name.to_string(),
            description: Some(official.description.to_string()),
            category: official.category,
            reset_interval: official.reset_interval,
            max_participants: official.max_participants,
            participant_count: 0,
            message_count: 0,
            room_type: RoomKind::Official,
            created_by: None,
            next_reset_at: Some(now + Duration::hours(official.reset_interval.hours() as i64)),
            expires_at: None,
            created_at: now,
            updated_at: now,
            active_participants: Vec::new(),
            participant_history: Vec::new(),
        };
        store::insert_room(&tx, &room)?;
    }
    tx.commit()?;

    Ok(OFFICIAL_ROOMS.len())
}
