//! Live broadcast groups, one per room.
//!
//! Delivery is a push onto each member's unbounded outbound queue, so a broadcast never
//! waits on a slow client and members see events in the order they were pushed.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ws::protocol::ServerEvent;
use crate::ws::{ConnectionId, ConnectionSender};

/// One connection in a room's group.
struct Member {
    user_id: String,
    sender: ConnectionSender,
}

#[derive(Clone, Default)]
pub struct RoomChannel {
    rooms: Arc<DashMap<String, HashMap<ConnectionId, Member>>>,
}

impl RoomChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room's group. Adding twice is harmless.
    pub fn add_member(
        &self,
        room_id: &str,
        conn_id: ConnectionId,
        user_id: &str,
        sender: ConnectionSender,
    ) {
        self.rooms.entry(room_id.to_string()).or_default().insert(
            conn_id,
            Member {
                user_id: user_id.to_string(),
                sender,
            },
        );
    }

    pub fn remove_member(&self, room_id: &str, conn_id: ConnectionId) {
        let mut now_empty = false;
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            members.remove(&conn_id);
            now_empty = members.is_empty();
        }
        if now_empty {
            self.rooms.remove_if(room_id, |_, members| members.is_empty());
        }
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|m| m.len()).unwrap_or(0)
    }

    /// Whether `user_id` has a connection other than `conn_id` in the room's group.
    pub fn has_other_connection(
        &self,
        room_id: &str,
        user_id: &str,
        conn_id: ConnectionId,
    ) -> bool {
        self.rooms
            .get(room_id)
            .map(|m| {
                m.iter()
                    .any(|(id, member)| *id != conn_id && member.user_id == user_id)
            })
            .unwrap_or(false)
    }

    /// Send the same event to every member, optionally skipping one connection.
    pub fn broadcast(&self, room_id: &str, event: &ServerEvent, exclude: Option<ConnectionId>) {
        let Some(msg) = event.to_message() else {
            return;
        };
        if let Some(members) = self.rooms.get(room_id) {
            for (conn_id, member) in members.iter() {
                if Some(*conn_id) == exclude {
                    continue;
                }
                let _ = member.sender.send(msg.clone());
            }
        }
    }

    /// Send an event built per recipient. Used where the payload depends on who
    /// receives it (`isOwn`).
    pub fn broadcast_with<F>(&self, room_id: &str, build: F)
    where
        F: Fn(ConnectionId) -> ServerEvent,
    {
        if let Some(members) = self.rooms.get(room_id) {
            for (conn_id, member) in members.iter() {
                if let Some(msg) = build(*conn_id).to_message() {
                    let _ = member.sender.send(msg);
                }
            }
        }
    }

    /// Send an event to a single connection.
    pub fn broadcast_to_one(sender: &ConnectionSender, event: &ServerEvent) {
        if let Some(msg) = event.to_message() {
            let _ = sender.send(msg);
        }
    }

    /// Tell every member the room is gone and drop the group.
    pub fn close_room(&self, room_id: &str, event: &ServerEvent) {
        self.broadcast(room_id, event, None);
        self.rooms.remove(room_id);
    }
}
