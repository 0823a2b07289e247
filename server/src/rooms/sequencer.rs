//! Per-room serialization point.
//!
//! Every join, leave and send for a room runs while holding that room's guard, so the
//! read-modify-write of the room record and the fan-out that follows happen as one step.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct RoomSequencer {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Proof that the holder is the single writer for `room_id`.
pub struct RoomGuard {
    room_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl RoomGuard {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }
}

impl RoomSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a room.
    pub async fn acquire(&self, room_id: &str) -> RoomGuard {
        // Clone the Arc out so the DashMap shard lock is not held across the await
        let lock = self
            .locks
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        RoomGuard {
            room_id: room_id.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Drop the lock entry of a deleted room.
    pub fn forget(&self, room_id: &str) {
        self.locks.remove(room_id);
    }

    #[cfg(test)]
    pub(crate) fn tracked_rooms(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_room_is_exclusive() {
        let sequencer = RoomSequencer::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sequencer = sequencer.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = sequencer.acquire("room-1").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_rooms_do_not_block() {
        let sequencer = RoomSequencer::new();
        let a = sequencer.acquire("room-a").await;
        let b = tokio::time::timeout(Duration::from_millis(200), sequencer.acquire("room-b"))
            .await
            .expect("other room should not wait");
        assert_eq!(a.room_id(), "room-a");
        assert_eq!(b.room_id(), "room-b");
    }

    #[tokio::test]
    async fn test_forget_removes_entry() {
        let sequencer = RoomSequencer::new();
        drop(sequencer.acquire("room-a").await);
        assert_eq!(sequencer.tracked_rooms(), 1);
        sequencer.forget("room-a");
        assert_eq!(sequencer.tracked_rooms(), 0);
    }
}
