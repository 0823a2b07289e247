//! Per-connection room state and event dispatch.
//!
//! A connection is authenticated before its actor starts, so every `ConnectionState`
//! starts in "authenticated, no room". `join_room` binds it to one room; `leave_room`
//! and `disconnect` unbind it.

use crate::error::RoomError;
use crate::rooms::channel::RoomChannel;
use crate::rooms::pipeline;
use crate::rooms::presence::{self, JoinKind};
use crate::state::AppState;
use crate::ws::protocol::{self, ClientEvent, ServerEvent};
use crate::ws::{ConnectionId, ConnectionSender};

/// The room a connection is currently in, and its handle there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomBinding {
    pub room_id: String,
    pub anonymous_id: String,
}

/// State owned by one connection's actor. Only the gateway mutates it.
pub struct ConnectionState {
    pub conn_id: ConnectionId,
    pub user_id: String,
    pub sender: ConnectionSender,
    binding: Option<RoomBinding>,
}

impl ConnectionState {
    pub fn new(conn_id: ConnectionId, user_id: String, sender: ConnectionSender) -> Self {
        Self {
            conn_id,
            user_id,
            sender,
            binding: None,
        }
    }

    pub fn binding(&self) -> Option<&RoomBinding> {
        self.binding.as_ref()
    }

    fn send_event(&self, event: &ServerEvent) {
        RoomChannel::broadcast_to_one(&self.sender, event);
    }
}

/// Decode one text frame and run it. Failures become an `error` event for this
/// connection only.
pub async fn dispatch(state: &AppState, conn: &mut ConnectionState, text: &str) {
    let event = match protocol::decode(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(conn_id = %conn.conn_id, error = %e, "Invalid client event");
            conn.send_event(&ServerEvent::error("Invalid event"));
            return;
        }
    };

    let (result, fallback) = match event {
        ClientEvent::JoinRoom(payload) => (
            join_room(state, conn, &payload.room_id).await,
            "Failed to join room",
        ),
        ClientEvent::SendMessage(payload) => (
            send_message(state, conn, &payload.room_id, &payload.content).await,
            "Failed to send message",
        ),
        ClientEvent::LeaveRoom(target) => (
            leave_room(state, conn, target.room_id()).await,
            "Failed to leave room",
        ),
    };

    if let Err(err) = result {
        if err.is_persistence() {
            tracing::error!(
                user_id = %conn.user_id,
                conn_id = %conn.conn_id,
                error = %err,
                "{}", fallback
            );
        } else {
            tracing::debug!(
                user_id = %conn.user_id,
                conn_id = %conn.conn_id,
                error = %err,
                "Room operation rejected"
            );
        }
        conn.send_event(&ServerEvent::error(err.client_message(fallback)));
    }
}

/// Join a room. A join into the room the connection is already bound to takes the
/// duplicate path; a join into a different room is refused.
pub async fn join_room(
    state: &AppState,
    conn: &mut ConnectionState,
    room_id: &str,
) -> Result<(), RoomError> {
    if let Some(binding) = &conn.binding {
        if binding.room_id != room_id {
            return Err(RoomError::AlreadyInRoom);
        }
    }

    let guard = state.sequencer.acquire(room_id).await;
    let outcome = presence::join(&state.db, &guard, &conn.user_id).await?;

    state
        .channels
        .add_member(room_id, conn.conn_id, &conn.user_id, conn.sender.clone());
    conn.binding = Some(RoomBinding {
        room_id: room_id.to_string(),
        anonymous_id: outcome.anonymous_id.clone(),
    });

    conn.send_event(&ServerEvent::joined_room(
        room_id,
        &outcome.anonymous_id,
        outcome.participant_count,
    ));
    if outcome.kind == JoinKind::New {
        state.channels.broadcast(
            room_id,
            &ServerEvent::user_joined(&outcome.anonymous_id, outcome.participant_count),
            Some(conn.conn_id),
        );
    }
    drop(guard);

    tracing::info!(
        user_id = %conn.user_id,
        room_id = %room_id,
        anonymous_id = %outcome.anonymous_id,
        participant_count = outcome.participant_count,
        duplicate = outcome.kind == JoinKind::Duplicate,
        "Joined room"
    );
    Ok(())
}

pub async fn send_message(
    state: &AppState,
    conn: &ConnectionState,
    room_id: &str,
    content: &str,
) -> Result<(), RoomError> {
    pipeline::send_message(state, conn, room_id, content).await?;
    Ok(())
}

/// Leave a room. Does nothing unless the connection is bound to `room_id`.
pub async fn leave_room(
    state: &AppState,
    conn: &mut ConnectionState,
    room_id: &str,
) -> Result<(), RoomError> {
    match &conn.binding {
        Some(binding) if binding.room_id == room_id => {}
        _ => return Ok(()),
    }

    let guard = state.sequencer.acquire(room_id).await;

    // The user stays present while another of their connections is still in the room
    let still_present = state
        .channels
        .has_other_connection(room_id, &conn.user_id, conn.conn_id);
    let outcome = if still_present {
        None
    } else {
        presence::leave(&state.db, &guard, &conn.user_id).await?
    };

    state.channels.remove_member(room_id, conn.conn_id);
    conn.binding = None;

    if let Some(outcome) = &outcome {
        state.channels.broadcast(
            room_id,
            &ServerEvent::user_left(&outcome.anonymous_id, outcome.participant_count),
            None,
        );
    }
    drop(guard);

    tracing::info!(
        user_id = %conn.user_id,
        room_id = %room_id,
        removed = outcome.is_some(),
        still_present,
        "Left room"
    );
    Ok(())
}

/// Release everything the connection holds. An ungraceful disconnect runs the same
/// leave as an explicit `leaveRoom`.
pub async fn disconnect(state: &AppState, conn: &mut ConnectionState) {
    let Some(binding) = conn.binding.clone() else {
        return;
    };

    if let Err(err) = leave_room(state, conn, &binding.room_id).await {
        // Presence stays stale until the next successful write to this room
        tracing::error!(
            user_id = %conn.user_id,
            room_id = %binding.room_id,
            error = %err,
            "Failed to clean up presence on disconnect"
        );
        state.channels.remove_member(&binding.room_id, conn.conn_id);
        conn.binding = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::rooms::identity::tests::empty_room;
    use crate::rooms::store;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn test_state() -> AppState {
        state_with_capacity(10)
    }

    fn state_with_capacity(max_participants: u32) -> AppState {
        let pool = db::init_in_memory().unwrap();
        {
            let conn = pool.lock().unwrap();
            store::insert_room(&conn, &empty_room(max_participants)).unwrap();
        }
        AppState::new(pool, b"test-secret".to_vec())
    }

    fn load_room(state: &AppState) -> crate::db::models::Room {
        let conn = state.db.lock().unwrap();
        store::load_room(&conn, "room-1").unwrap().unwrap()
    }

    fn connection(user_id: &str) -> (ConnectionState, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionState::new(Uuid::now_v7(), user_id.to_string(), tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            out.push(serde_json::from_str(text.as_str()).unwrap());
        }
        out
    }

    fn events(frames: &[serde_json::Value]) -> Vec<String> {
        frames
            .iter()
            .map(|f| f["event"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_join_binds_and_notifies_others() {
        let state = test_state();
        let (mut a, mut a_rx) = connection("ua");
        let (mut b, mut b_rx) = connection("ub");

        join_room(&state, &mut a, "room-1").await.unwrap();
        join_room(&state, &mut b, "room-1").await.unwrap();

        let a_frames = drain(&mut a_rx);
        assert_eq!(events(&a_frames), vec!["joinedRoom", "userJoined"]);
        assert_eq!(a_frames[1]["data"]["participantCount"], 2);

        let b_frames = drain(&mut b_rx);
        assert_eq!(events(&b_frames), vec!["joinedRoom"]);
        assert_eq!(
            b_frames[0]["data"]["anonymousId"],
            b.binding().unwrap().anonymous_id.as_str()
        );
    }

    #[tokio::test]
    async fn test_duplicate_join_is_silent_to_others() {
        let state = test_state();
        let (mut a, mut a_rx) = connection("ua");
        let (mut b, _b_rx) = connection("ub");

        join_room(&state, &mut a, "room-1").await.unwrap();
        join_room(&state, &mut b, "room-1").await.unwrap();
        drain(&mut a_rx);

        join_room(&state, &mut b, "room-1").await.unwrap();
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn test_join_other_room_requires_leave() {
        let state = test_state();
        let (mut a, _rx) = connection("ua");
        join_room(&state, &mut a, "room-1").await.unwrap();

        assert!(matches!(
            join_room(&state, &mut a, "room-2").await,
            Err(RoomError::AlreadyInRoom)
        ));
        assert_eq!(a.binding().unwrap().room_id, "room-1");
    }

    #[tokio::test]
    async fn test_leave_when_unbound_is_noop() {
        let state = test_state();
        let (mut a, mut a_rx) = connection("ua");
        let (mut b, _b_rx) = connection("ub");
        join_room(&state, &mut a, "room-1").await.unwrap();
        drain(&mut a_rx);

        leave_room(&state, &mut b, "room-1").await.unwrap();
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_matches_explicit_leave() {
        let state = test_state();
        let (mut a, mut a_rx) = connection("ua");
        let (mut b, _b_rx) = connection("ub");
        join_room(&state, &mut a, "room-1").await.unwrap();
        join_room(&state, &mut b, "room-1").await.unwrap();
        drain(&mut a_rx);

        disconnect(&state, &mut b).await;
        let frames = drain(&mut a_rx);
        assert_eq!(events(&frames), vec!["userLeft"]);
        assert_eq!(frames[0]["data"]["participantCount"], 1);
        assert!(b.binding().is_none());
        assert_eq!(state.channels.member_count("room-1"), 1);

        // A second cleanup has nothing left to do
        disconnect(&state, &mut b).await;
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_reports_errors_to_sender_only() {
        let state = test_state();
        let (mut a, mut a_rx) = connection("ua");
        let (mut b, mut b_rx) = connection("ub");
        join_room(&state, &mut b, "room-1").await.unwrap();
        drain(&mut b_rx);

        dispatch(
            &state,
            &mut a,
            r#"{"event":"sendMessage","data":{"roomId":"room-1","content":"hi"}}"#,
        )
        .await;
        dispatch(&state, &mut a, "garbage").await;
        dispatch(
            &state,
            &mut a,
            r#"{"event":"joinRoom","data":{"roomId":"missing"}}"#,
        )
        .await;

        let frames = drain(&mut a_rx);
        let messages: Vec<&str> = frames
            .iter()
            .map(|f| f["data"]["message"].as_str().unwrap())
            .collect();
        assert_eq!(
            messages,
            vec!["You must join a room first", "Invalid event", "Room not found"]
        );
        assert!(drain(&mut b_rx).is_empty());
    }

    #[tokio::test]
    async fn test_send_sets_is_own_per_connection() {
        let state = test_state();
        let (mut a, mut a_rx) = connection("ua");
        let (mut b, mut b_rx) = connection("ub");
        join_room(&state, &mut a, "room-1").await.unwrap();
        join_room(&state, &mut b, "room-1").await.unwrap();
        drain(&mut a_rx);
        drain(&mut b_rx);

        send_message(&state, &a, "room-1", "  hello  ").await.unwrap();

        let mine = drain(&mut a_rx);
        let theirs = drain(&mut b_rx);
        assert_eq!(mine[0]["data"]["isOwn"], true);
        assert_eq!(theirs[0]["data"]["isOwn"], false);
        assert_eq!(mine[0]["data"]["content"], "hello");
        assert_eq!(mine[0]["data"]["_id"], theirs[0]["data"]["_id"]);
    }

    #[tokio::test]
    async fn test_failed_send_broadcasts_nothing() {
        let state = test_state();
        let (mut a, mut a_rx) = connection("ua");
        let (mut b, mut b_rx) = connection("ub");
        join_room(&state, &mut a, "room-1").await.unwrap();
        join_room(&state, &mut b, "room-1").await.unwrap();
        drain(&mut a_rx);
        drain(&mut b_rx);

        state
            .db
            .lock()
            .unwrap()
            .execute_batch("DROP TABLE room_messages;")
            .unwrap();

        dispatch(
            &state,
            &mut a,
            r#"{"event":"sendMessage","data":{"roomId":"room-1","content":"hi"}}"#,
        )
        .await;

        let frames = drain(&mut a_rx);
        assert_eq!(events(&frames), vec!["error"]);
        assert_eq!(frames[0]["data"]["message"], "Failed to send message");
        assert!(drain(&mut b_rx).is_empty());

        let count: i64 = state
            .db
            .lock()
            .unwrap()
            .query_row(
                "SELECT message_count FROM rooms WHERE id = 'room-1'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_second_connection_keeps_user_present() {
        let state = test_state();
        let (mut a, mut a_rx) = connection("ua");
        let (mut tab1, _tab1_rx) = connection("ub");
        let (mut tab2, _tab2_rx) = connection("ub");
        join_room(&state, &mut a, "room-1").await.unwrap();
        join_room(&state, &mut tab1, "room-1").await.unwrap();
        join_room(&state, &mut tab2, "room-1").await.unwrap();
        assert_eq!(
            tab1.binding().unwrap().anonymous_id,
            tab2.binding().unwrap().anonymous_id
        );
        drain(&mut a_rx);

        disconnect(&state, &mut tab2).await;
        assert!(drain(&mut a_rx).is_empty());
        let room = load_room(&state);
        assert_eq!(room.participant_count, 2);
        assert!(room.active_participant("ub").is_some());
        assert_eq!(state.channels.member_count("room-1"), 2);

        send_message(&state, &tab1, "room-1", "still here").await.unwrap();
        assert_eq!(events(&drain(&mut a_rx)), vec!["newMessage"]);

        leave_room(&state, &mut tab1, "room-1").await.unwrap();
        let frames = drain(&mut a_rx);
        assert_eq!(events(&frames), vec!["userLeft"]);
        assert_eq!(frames[0]["data"]["participantCount"], 1);
        assert_eq!(load_room(&state).participant_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_each_get_one_entry() {
        let state = state_with_capacity(50);

        let mut handles = Vec::new();
        for i in 0..20 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                let (mut conn, rx) = connection(&format!("user-{}", i));
                join_room(&state, &mut conn, "room-1").await.unwrap();
                (conn, rx)
            }));
        }
        let mut joined = Vec::new();
        for handle in handles {
            joined.push(handle.await.unwrap());
        }

        let room = load_room(&state);
        assert_eq!(room.participant_count, 20);
        assert_eq!(room.active_participants.len(), 20);
        assert_eq!(room.participant_history.len(), 20);

        let handles: std::collections::HashSet<&str> = room
            .participant_history
            .iter()
            .map(|h| h.anonymous_id.as_str())
            .collect();
        assert_eq!(handles.len(), 20);

        for (conn, _rx) in &joined {
            let entry = room.history_entry(&conn.user_id).unwrap();
            assert_eq!(conn.binding().unwrap().anonymous_id, entry.anonymous_id);
        }
        assert_eq!(state.channels.member_count("room-1"), 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_keep_count_and_order() {
        let state = test_state();
        let mut receivers = Vec::new();
        let mut senders = Vec::new();
        for i in 0..5 {
            let (mut conn, rx) = connection(&format!("user-{}", i));
            join_room(&state, &mut conn, "room-1").await.unwrap();
            receivers.push(rx);
            senders.push(conn);
        }
        for rx in receivers.iter_mut() {
            drain(rx);
        }

        let mut handles = Vec::new();
        for conn in senders {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                for n in 0..10 {
                    send_message(&state, &conn, "room-1", &format!("msg {}", n))
                        .await
                        .unwrap();
                }
                conn
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let (message_count, stored) = {
            let conn = state.db.lock().unwrap();
            let room = store::load_room(&conn, "room-1").unwrap().unwrap();
            let stored = store::list_messages(&conn, "room-1", 0, 100).unwrap();
            (room.message_count, stored)
        };
        assert_eq!(message_count, 50);
        assert_eq!(stored.len(), 50);

        let persisted: Vec<String> = stored.into_iter().map(|m| m.id).collect();
        for rx in receivers.iter_mut() {
            let delivered: Vec<String> = drain(rx)
                .iter()
                .filter(|f| f["event"] == "newMessage")
                .map(|f| f["data"]["_id"].as_str().unwrap().to_string())
                .collect();
            assert_eq!(delivered, persisted);
        }
    }
}
