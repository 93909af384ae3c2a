use crate::game::room::{Room, RoomSettings, RoomStats};
use crate::pricing::PriceQuote;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub players: usize,
    pub live_entities: usize,
    pub food: usize,
}

/// Registry of live rooms. Joins fill the first room with spare capacity
/// before a new one is opened.
#[derive(Debug)]
pub struct RoomManager {
    rooms: DashMap<String, Arc<Room>>,
    assign_lock: Mutex<()>,
    next_room: AtomicU64,
    settings: RoomSettings,
    prices: Arc<dyn PriceQuote>,
}

impl RoomManager {
    pub fn new(settings: RoomSettings, prices: Arc<dyn PriceQuote>) -> Self {
        Self {
            rooms: DashMap::new(),
            assign_lock: Mutex::new(()),
            next_room: AtomicU64::new(1),
            settings,
            prices,
        }
    }

    pub fn room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Attaches a session to a room with a free seat, creating one when
    /// every existing room is full.
    pub async fn assign(&self) -> Arc<Room> {
        let _guard = self.assign_lock.lock().await;
        let mut candidates: Vec<Arc<Room>> = self
            .rooms
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        candidates.sort_by(|a, b| a.id().cmp(b.id()));

        for room in candidates {
            if room.stats().await.players < room.capacity() {
                return room;
            }
        }

        let room_id = format!("room-{}", self.next_room.fetch_add(1, Ordering::SeqCst));
        let room = Arc::new(Room::new(
            room_id.clone(),
            self.settings.clone(),
            Arc::clone(&self.prices),
        ));
        self.rooms.insert(room_id.clone(), Arc::clone(&room));
        tracing::info!(room_id = %room_id, "room created");
        room
    }

    /// Drops `room_id` once it has neither sessions nor live entities.
    pub async fn release_if_empty(&self, room_id: &str) -> bool {
        let _guard = self.assign_lock.lock().await;
        let Some(room) = self.room(room_id) else {
            return false;
        };
        if !room.is_empty().await {
            return false;
        }
        self.rooms.remove(room_id);
        tracing::info!(room_id, "room removed");
        true
    }

    pub async fn summaries(&self) -> Vec<RoomSummary> {
        let rooms: Vec<Arc<Room>> = self
            .rooms
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut summaries = Vec::with_capacity(rooms.len());
        for room in rooms {
            let RoomStats {
                players,
                live_entities,
                food,
            } = room.stats().await;
            summaries.push(RoomSummary {
                room_id: room.id().to_string(),
                players,
                live_entities,
                food,
            });
        }
        summaries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::FixedRate;
    use std::time::Duration;

    fn manager(max_players: usize) -> RoomManager {
        RoomManager::new(
            RoomSettings {
                tick_interval: Duration::from_millis(16),
                max_players,
                outbound_queue_capacity: 8,
                spectator_username: None,
            },
            Arc::new(FixedRate(1.0)),
        )
    }

    #[tokio::test]
    async fn fills_first_room_before_opening_another() {
        let manager = manager(2);
        let first = manager.assign().await;
        let _a = first.add_session("a").await;
        let again = manager.assign().await;
        assert_eq!(first.id(), again.id());
        let _b = again.add_session("b").await;

        let overflow = manager.assign().await;
        assert_ne!(overflow.id(), first.id());
        assert_eq!(manager.room_count(), 2);
    }

    #[tokio::test]
    async fn empty_rooms_are_released() {
        let manager = manager(2);
        let room = manager.assign().await;
        let _io = room.add_session("a").await;
        assert!(!manager.release_if_empty(room.id()).await);

        room.remove_session("a").await;
        assert!(manager.release_if_empty(room.id()).await);
        assert_eq!(manager.room_count(), 0);
        assert!(manager.summaries().await.is_empty());
    }

    #[tokio::test]
    async fn summaries_report_room_contents() {
        let manager = manager(4);
        let room = manager.assign().await;
        let _io = room.add_session("a").await;

        let summaries = manager.summaries().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].room_id, room.id());
        assert_eq!(summaries[0].players, 1);
        assert_eq!(summaries[0].live_entities, 0);
        assert!(summaries[0].food > 0);
    }
}
