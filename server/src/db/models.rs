/// Database row types.
/// These correspond to the SQLite schema defined in migrations.rs.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User record. Owned by the account component; this crate only reads it
/// to authenticate connections.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// True when the password was changed after a credential issued at `issued_at`
    /// (Unix seconds) was minted.
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        self.password_changed_at
            .map(|changed| changed.timestamp() > issued_at)
            .unwrap_or(false)
    }
}

/// Room topic category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomCategory {
    Support,
    Professional,
    Creative,
    Relationships,
    Technology,
    Discussion,
}

impl RoomCategory {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Support" => Some(Self::Support),
            "Professional" => Some(Self::Professional),
            "Creative" => Some(Self::Creative),
            "Relationships" => Some(Self::Relationships),
            "Technology" => Some(Self::Technology),
            "Discussion" => Some(Self::Discussion),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Support => "Support",
            Self::Professional => "Professional",
            Self::Creative => "Creative",
            Self::Relationships => "Relationships",
            Self::Technology => "Technology",
            Self::Discussion => "Discussion",
        }
    }
}

/// How often a room is scheduled to reset, in hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ResetInterval {
    Day = 24,
    ThreeDays = 72,
    Week = 168,
    Month = 720,
}

impl ResetInterval {
    pub fn hours(&self) -> u32 {
        *self as u32
    }
}

impl Default for ResetInterval {
    fn default() -> Self {
        Self::Day
    }
}

impl TryFrom<u32> for ResetInterval {
    type Error = String;

    fn try_from(hours: u32) -> Result<Self, Self::Error> {
        match hours {
            24 => Ok(Self::Day),
            72 => Ok(Self::ThreeDays),
            168 => Ok(Self::Week),
            720 => Ok(Self::Month),
            other => Err(format!("resetInterval must be one of 24, 72, 168, 720 (got {})", other)),
        }
    }
}

impl From<ResetInterval> for u32 {
    fn from(interval: ResetInterval) -> u32 {
        interval.hours()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomKind {
    #[serde(rename = "official")]
    Official,
    #[serde(rename = "user-created")]
    UserCreated,
}

impl RoomKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "official" => Some(Self::Official),
            "user-created" => Some(Self::UserCreated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::UserCreated => "user-created",
        }
    }
}

/// A user currently connected to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveParticipant {
    pub user_id: String,
    pub anonymous_id: String,
    pub joined_at: DateTime<Utc>,
}

/// Durable (room, user) -> handle mapping. Never removed while the room exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub user_id: String,
    pub anonymous_id: String,
    pub first_joined_at: DateTime<Utc>,
}

/// A room with its embedded presence lists.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: RoomCategory,
    pub reset_interval: ResetInterval,
    pub max_participants: u32,
    pub participant_count: u32,
    pub message_count: u64,
    pub room_type: RoomKind,
    pub created_by: Option<String>,
    pub next_reset_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub active_participants: Vec<ActiveParticipant>,
    pub participant_history: Vec<HistoryEntry>,
}

impl Room {
    pub fn active_participant(&self, user_id: &str) -> Option<&ActiveParticipant> {
        self.active_participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn history_entry(&self, user_id: &str) -> Option<&HistoryEntry> {
        self.participant_history.iter().find(|h| h.user_id == user_id)
    }

    pub fn is_full(&self) -> bool {
        self.active_participants.len() >= self.max_participants as usize
    }
}

/// A persisted chat message. Carries no per-recipient fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMessage {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub anonymous_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
