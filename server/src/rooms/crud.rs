//! HTTP room endpoints. Rosters expose anonymous handles only, never real user ids.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::db::models::{ResetInterval, Room, RoomCategory, RoomKind, RoomMessage};
use crate::error::RoomError;
use crate::rooms::store;
use crate::state::AppState;
use crate::ws::protocol::ServerEvent;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_MAX_PARTICIPANTS: u32 = 100;
const USER_ROOM_LIFETIME_DAYS: i64 = 30;

// --- Response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponse {
    pub anonymous_id: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    #[serde(rename = "_id")]
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
    pub active_participants: Vec<ParticipantResponse>,
}

impl From<Room> for RoomResponse {
    fn from(room: Room) -> Self {
        Self {
            id: room.id,
            name: room.name,
            description: room.description,
            category: room.category,
            reset_interval: room.reset_interval,
            max_participants: room.max_participants,
            participant_count: room.participant_count,
            message_count: room.message_count,
            room_type: room.room_type,
            created_by: room.created_by,
            next_reset_at: room.next_reset_at,
            expires_at: room.expires_at,
            created_at: room.created_at,
            updated_at: room.updated_at,
            active_participants: room
                .active_participants
                .into_iter()
                .map(|p| ParticipantResponse {
                    anonymous_id: p.anonymous_id,
                    joined_at: p.joined_at,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomResponse>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub room_id: String,
    pub content: String,
    pub anonymous_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_own: bool,
}

impl MessageResponse {
    fn for_viewer(message: RoomMessage, viewer_id: &str) -> Self {
        Self {
            is_own: message.user_id == viewer_id,
            id: message.id,
            room_id: message.room_id,
            content: message.content,
            anonymous_id: message.anonymous_id,
            timestamp: message.created_at,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_messages: u64,
    pub messages_per_page: u32,
}

#[derive(Debug, Serialize)]
pub struct MessagePageResponse {
    pub messages: Vec<MessageResponse>,
    pub pagination: Pagination,
}

// --- Request types ---

#[derive(Debug, Deserialize)]
pub struct ListRoomsQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub reset_interval: Option<u32>,
    pub max_participants: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoomRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub reset_interval: Option<u32>,
    pub max_participants: Option<u32>,
}

// --- Validation ---

fn validate_name(name: &str) -> Result<String, RoomError> {
    let name = name.trim();
    let len = name.chars().count();
    if !(3..=50).contains(&len) {
        return Err(RoomError::InvalidRoom(
            "Room name must be between 3 and 50 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

fn validate_description(description: &str) -> Result<String, RoomError> {
    let description = description.trim();
    let len = description.chars().count();
    if !(3..=350).contains(&len) {
        return Err(RoomError::InvalidRoom(
            "Room description must be between 3 and 350 characters".to_string(),
        ));
    }
    Ok(description.to_string())
}

fn parse_category(category: &str) -> Result<RoomCategory, RoomError> {
    RoomCategory::from_str(category)
        .ok_or_else(|| RoomError::InvalidRoom(format!("Unknown room category: {}", category)))
}

fn parse_reset_interval(hours: u32) -> Result<ResetInterval, RoomError> {
    ResetInterval::try_from(hours).map_err(RoomError::InvalidRoom)
}

fn validate_max_participants(max: u32) -> Result<u32, RoomError> {
    if !(2..=1000).contains(&max) {
        return Err(RoomError::InvalidRoom(
            "maxParticipants must be between 2 and 1000".to_string(),
        ));
    }
    Ok(max)
}

/// Clamp page/limit query values to their defaults and bounds.
pub fn page_window(query: &MessagesQuery) -> (u32, u32) {
    let page = query.page.filter(|p| *p >= 1).unwrap_or(1);
    let limit = query
        .limit
        .filter(|l| *l >= 1)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);
    (page, limit)
}

fn pagination(page: u32, limit: u32, total: u64) -> Pagination {
    Pagination {
        current_page: page,
        total_pages: total.div_ceil(limit as u64),
        total_messages: total,
        messages_per_page: limit,
    }
}

fn require_creator(room: &Room, user_id: &str) -> Result<(), RoomError> {
    if room.created_by.as_deref() != Some(user_id) {
        return Err(RoomError::Forbidden);
    }
    Ok(())
}

// --- Handlers ---

/// GET /api/rooms: List rooms, newest first, optionally filtered by category.
pub async fn list_rooms(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ListRoomsQuery>,
) -> Result<Json<RoomListResponse>, RoomError> {
    let category = query.category.as_deref().map(parse_category).transpose()?;

    let db = state.db.clone();
    let rooms = tokio::task::spawn_blocking(move || -> Result<Vec<Room>, RoomError> {
        let conn = db.lock()?;
        Ok(store::list_rooms(&conn, category)?)
    })
    .await??;

    let rooms: Vec<RoomResponse> = rooms.into_iter().map(RoomResponse::from).collect();
    Ok(Json(RoomListResponse {
        count: rooms.len(),
        rooms,
    }))
}

/// GET /api/rooms/{id}: Room metadata and the anonymous roster.
pub async fn get_room(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<RoomResponse>, RoomError> {
    let db = state.db.clone();
    let room = tokio::task::spawn_blocking(move || -> Result<Option<Room>, RoomError> {
        let conn = db.lock()?;
        Ok(store::load_room(&conn, &room_id)?)
    })
    .await??
    .ok_or(RoomError::RoomNotFound)?;

    Ok(Json(room.into()))
}

/// GET /api/rooms/{id}/messages?page&limit: Message history, oldest first, with
/// `isOwn` computed against the caller.
pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagePageResponse>, RoomError> {
    let (page, limit) = page_window(&query);
    let offset = (page as u64 - 1) * limit as u64;

    let db = state.db.clone();
    let (messages, total) =
        tokio::task::spawn_blocking(move || -> Result<(Vec<RoomMessage>, u64), RoomError> {
            let conn = db.lock()?;
            if store::load_room(&conn, &room_id)?.is_none() {
                return Err(RoomError::RoomNotFound);
            }
            let messages = store::list_messages(&conn, &room_id, offset, limit)?;
            let total = store::count_messages(&conn, &room_id)?;
            Ok((messages, total))
        })
        .await??;

    Ok(Json(MessagePageResponse {
        messages: messages
            .into_iter()
            .map(|m| MessageResponse::for_viewer(m, &user.id))
            .collect(),
        pagination: pagination(page, limit, total),
    }))
}

/// POST /api/rooms: Create a user room owned by the caller.
pub async fn create_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomResponse>), RoomError> {
    let name = validate_name(&req.name)?;
    let description = req
        .description
        .as_deref()
        .map(validate_description)
        .transpose()?;
    let category = parse_category(&req.category)?;
    let reset_interval = req
        .reset_interval
        .map(parse_reset_interval)
        .transpose()?
        .unwrap_or_default();
    let max_participants =
        validate_max_participants(req.max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS))?;

    let now = Utc::now();
    let room = Room {
        id: Uuid::now_v7().to_string(),
        name,
        description,
        category,
        reset_interval,
        max_participants,
        participant_count: 0,
        message_count: 0,
        room_type: RoomKind::UserCreated,
        created_by: Some(user.id.clone()),
        next_reset_at: Some(now + Duration::hours(reset_interval.hours() as i64)),
        expires_at: Some(now + Duration::days(USER_ROOM_LIFETIME_DAYS)),
        created_at: now,
        updated_at: now,
        active_participants: Vec::new(),
        participant_history: Vec::new(),
    };

    let db = state.db.clone();
    let record = room.clone();
    tokio::task::spawn_blocking(move || -> Result<(), RoomError> {
        let conn = db.lock()?;
        store::insert_room(&conn, &record)?;
        Ok(())
    })
    .await??;

    tracing::info!(room_id = %room.id, user_id = %user.id, name = %room.name, "Room created");

    Ok((StatusCode::CREATED, Json(room.into())))
}

/// PUT /api/rooms/{id}: Edit room metadata (creator only).
pub async fn update_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
    Json(req): Json<UpdateRoomRequest>,
) -> Result<Json<RoomResponse>, RoomError> {
    let name = req.name.as_deref().map(validate_name).transpose()?;
    let description = req
        .description
        .as_deref()
        .map(validate_description)
        .transpose()?;
    let category = req.category.as_deref().map(parse_category).transpose()?;
    let reset_interval = req.reset_interval.map(parse_reset_interval).transpose()?;
    let max_participants = req
        .max_participants
        .map(validate_max_participants)
        .transpose()?;

    let db = state.db.clone();
    let user_id = user.id.clone();
    let room = tokio::task::spawn_blocking(move || -> Result<Room, RoomError> {
        let conn = db.lock()?;
        let mut room = store::load_room(&conn, &room_id)?.ok_or(RoomError::RoomNotFound)?;
        require_creator(&room, &user_id)?;

        if let Some(name) = name {
            room.name = name;
        }
        if let Some(description) = description {
            room.description = Some(description);
        }
        if let Some(category) = category {
            room.category = category;
        }
        if let Some(reset_interval) = reset_interval {
            room.reset_interval = reset_interval;
        }
        if let Some(max_participants) = max_participants {
            room.max_participants = max_participants;
        }
        room.updated_at = Utc::now();

        store::update_room_metadata(&conn, &room)?;
        Ok(room)
    })
    .await??;

    tracing::info!(room_id = %room.id, user_id = %user.id, "Room updated");

    Ok(Json(room.into()))
}

/// DELETE /api/rooms/{id}: Delete a room and its messages (creator only).
/// Live members get `roomDeleted` and the room's channel is dropped.
pub async fn delete_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> Result<StatusCode, RoomError> {
    // Let in-flight joins and sends on this room finish first
    let guard = state.sequencer.acquire(&room_id).await;

    let db = state.db.clone();
    let id = room_id.clone();
    let user_id = user.id.clone();
    tokio::task::spawn_blocking(move || -> Result<(), RoomError> {
        let mut conn = db.lock()?;
        let room = store::load_room(&conn, &id)?.ok_or(RoomError::RoomNotFound)?;
        require_creator(&room, &user_id)?;

        let tx = conn.transaction()?;
        store::delete_room(&tx, &id)?;
        tx.commit()?;
        Ok(())
    })
    .await??;

    state
        .channels
        .close_room(&room_id, &ServerEvent::room_deleted(&room_id));
    state.sequencer.forget(&room_id);
    drop(guard);

    tracing::info!(room_id = %room_id, user_id = %user.id, "Room deleted");

    Ok(StatusCode::NO_CONTENT)
}
