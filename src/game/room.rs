pub mod session;

use super::constants::FRAME_MS;
use super::types::InputFrame;
use super::world::{GameWorld, TickOutput, WorldEvent};
use crate::app::time::now_millis;
use crate::config::ServerConfig;
use crate::pricing::PriceQuote;
use crate::protocol::{
    self, ClientMessage, CollisionReportPayload, FoodEatenPayload, FoodSpawnedPayload,
    InputPayload, JoinPayload, ServerMessage, TimePayload,
};
use crate::shared::names::sanitize_player_name;
use session::{session_channels, OutboundError, SessionIo, SessionOutbound};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

const DEFAULT_PLAYER_NAME: &str = "Player";

#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub tick_interval: Duration,
    pub max_players: usize,
    pub outbound_queue_capacity: usize,
    pub spectator_username: Option<String>,
}

impl From<&ServerConfig> for RoomSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            max_players: config.max_players_per_room,
            outbound_queue_capacity: config.outbound_queue_capacity,
            spectator_username: config.spectator_username.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomStats {
    pub players: usize,
    pub live_entities: usize,
    pub food: usize,
}

#[derive(Debug)]
pub struct Room {
    id: String,
    settings: RoomSettings,
    prices: Arc<dyn PriceQuote>,
    state: Mutex<RoomState>,
    running: AtomicBool,
}

#[derive(Debug)]
struct RoomState {
    room_id: String,
    sessions: HashMap<String, SessionOutbound>,
    world: GameWorld,
}

impl Room {
    pub fn new(id: impl Into<String>, settings: RoomSettings, prices: Arc<dyn PriceQuote>) -> Self {
        let id = id.into();
        let world = GameWorld::new(settings.spectator_username.clone());
        Self {
            state: Mutex::new(RoomState {
                room_id: id.clone(),
                sessions: HashMap::new(),
                world,
            }),
            id,
            settings,
            prices,
            running: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn capacity(&self) -> usize {
        self.settings.max_players
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn stats(&self) -> RoomStats {
        let state = self.state.lock().await;
        RoomStats {
            players: state.sessions.len(),
            live_entities: state.world.live_count(),
            food: state.world.food().len(),
        }
    }

    /// A room with neither connections nor live entities can be dropped.
    pub async fn is_empty(&self) -> bool {
        let stats = self.stats().await;
        stats.players == 0 && stats.live_entities == 0
    }

    pub async fn add_session(&self, session_id: &str) -> SessionIo {
        let (outbound, io) = session_channels(session_id, self.settings.outbound_queue_capacity);
        let mut state = self.state.lock().await;
        state.sessions.insert(session_id.to_string(), outbound);
        tracing::debug!(room_id = %self.id, session_id, "session attached");
        io
    }

    pub async fn remove_session(&self, session_id: &str) {
        let mut state = self.state.lock().await;
        state.disconnect_session(session_id);
    }

    pub async fn handle_client_message(self: &Arc<Self>, session_id: &str, message: ClientMessage) {
        let mut state = self.state.lock().await;
        match message {
            ClientMessage::Join(join) => {
                let rate = self.prices.current_rate();
                let joined = state.handle_join(session_id, join, rate);
                drop(state);
                if joined {
                    self.ensure_loop();
                }
            }
            ClientMessage::Input(input) => state.handle_input(session_id, input),
            ClientMessage::CollisionReport(report) => {
                state.handle_collision_report(session_id, report, now_millis())
            }
            ClientMessage::Ping(ping) => state.handle_ping(session_id, ping),
        }
    }

    fn ensure_loop(self: &Arc<Self>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let room = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(room.settings.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_tick = Instant::now();
            tracing::info!(room_id = %room.id, "room loop started");
            loop {
                interval.tick().await;
                let now = Instant::now();
                let dt = now.duration_since(last_tick).as_secs_f64() * 1000.0 / FRAME_MS;
                last_tick = now;

                let mut state = room.state.lock().await;
                if state.sessions.is_empty() {
                    room.running.store(false, Ordering::SeqCst);
                    break;
                }
                state.tick(dt, now_millis());
            }
            tracing::info!(room_id = %room.id, "room loop stopped");
        });
    }
}

impl RoomState {
    fn disconnect_session(&mut self, session_id: &str) {
        let had_session = self.sessions.remove(session_id).is_some();
        let was_alive = self.world.remove_player(session_id);
        if had_session || was_alive {
            tracing::info!(room_id = %self.room_id, session_id, was_alive, "session disconnected");
        }
    }

    /// Sessions evicted by `drop_stale` may still have frames in flight.
    fn is_attached(&self, session_id: &str) -> bool {
        let attached = self.sessions.contains_key(session_id);
        if !attached {
            tracing::debug!(room_id = %self.room_id, session_id, "ignoring frame from detached session");
        }
        attached
    }

    fn handle_join(&mut self, session_id: &str, join: JoinPayload, rate: f64) -> bool {
        if !self.is_attached(session_id) {
            return false;
        }
        let username = sanitize_player_name(&join.username, DEFAULT_PLAYER_NAME);
        let Some(outcome) = self
            .world
            .spawn_player(session_id, &username, join.stake_amount, rate)
        else {
            tracing::warn!(room_id = %self.room_id, session_id, "join ignored while entity is alive");
            return false;
        };

        self.send_hi(session_id, &ServerMessage::JoinAccepted(outcome.accepted));
        let joined = ServerMessage::PlayerJoined(outcome.joined);
        let others: Vec<String> = self
            .sessions
            .keys()
            .filter(|id| id.as_str() != session_id)
            .cloned()
            .collect();
        for other in others {
            self.send_hi(&other, &joined);
        }
        true
    }

    fn handle_input(&mut self, session_id: &str, input: InputPayload) {
        if !self.is_attached(session_id) {
            return;
        }
        self.world.enqueue_input(
            session_id,
            InputFrame {
                target_angle: input.target_angle,
                is_boosting: input.is_boosting,
                sequence: input.sequence,
            },
        );
    }

    fn handle_collision_report(&mut self, session_id: &str, report: CollisionReportPayload, now: i64) {
        if !self.is_attached(session_id) {
            return;
        }
        if self
            .world
            .process_collision_report(session_id, &report.victim_id, &report.killer_id, now)
        {
            self.dispatch_events();
        }
    }

    fn handle_ping(&mut self, session_id: &str, ping: TimePayload) {
        self.send_hi(session_id, &ServerMessage::Pong(ping));
    }

    fn tick(&mut self, dt: f64, now: i64) {
        let TickOutput {
            snapshot,
            eaten_food,
        } = self.world.tick(dt, now);

        if let Some(snapshot) = snapshot {
            if let Some(payload) = encode(&ServerMessage::GameState(snapshot)) {
                for outbound in self.sessions.values() {
                    outbound.store_state(payload.clone());
                }
            }
        }

        if !eaten_food.is_empty() {
            self.broadcast_lo(&ServerMessage::FoodEaten(FoodEatenPayload {
                food_ids: eaten_food,
            }));
        }
        self.dispatch_events();
    }

    fn dispatch_events(&mut self) {
        for event in self.world.drain_events() {
            match event {
                WorldEvent::Death(report) => {
                    self.broadcast_hi(&ServerMessage::PlayerDied(report.player_died()));
                    self.broadcast_hi(&ServerMessage::KillFeed(report.kill_feed()));
                }
                WorldEvent::FoodOfInterest { player_id, foods } => {
                    self.send_lo(&player_id, &ServerMessage::FoodSpawned(FoodSpawnedPayload { foods }));
                }
            }
        }
    }

    fn send_hi(&mut self, session_id: &str, message: &ServerMessage) {
        let Some(payload) = encode(message) else { return };
        let result = match self.sessions.get(session_id) {
            Some(outbound) => outbound.send_hi(payload),
            None => return,
        };
        self.handle_send_result(session_id, result);
    }

    fn send_lo(&mut self, session_id: &str, message: &ServerMessage) {
        let Some(payload) = encode(message) else { return };
        let result = match self.sessions.get(session_id) {
            Some(outbound) => outbound.send_lo(payload),
            None => return,
        };
        self.handle_send_result(session_id, result);
    }

    fn broadcast_hi(&mut self, message: &ServerMessage) {
        let Some(payload) = encode(message) else { return };
        let stale: Vec<(String, OutboundError)> = self
            .sessions
            .iter()
            .filter_map(|(id, outbound)| outbound.send_hi(payload.clone()).err().map(|e| (id.clone(), e)))
            .collect();
        self.drop_stale(stale);
    }

    fn broadcast_lo(&mut self, message: &ServerMessage) {
        let Some(payload) = encode(message) else { return };
        let stale: Vec<(String, OutboundError)> = self
            .sessions
            .iter()
            .filter_map(|(id, outbound)| outbound.send_lo(payload.clone()).err().map(|e| (id.clone(), e)))
            .collect();
        self.drop_stale(stale);
    }

    fn handle_send_result(&mut self, session_id: &str, result: Result<(), OutboundError>) {
        if let Err(error) = result {
            self.drop_stale(vec![(session_id.to_string(), error)]);
        }
    }

    /// A lane that is full or closed means the client cannot keep up; the
    /// session is cut rather than buffering without bound.
    fn drop_stale(&mut self, stale: Vec<(String, OutboundError)>) {
        for (session_id, error) in stale {
            tracing::warn!(room_id = %self.room_id, session_id = %session_id, %error, "dropping unresponsive session");
            self.disconnect_session(&session_id);
        }
    }
}

fn encode(message: &ServerMessage) -> Option<Vec<u8>> {
    match protocol::encode_server_message(message) {
        Ok(payload) => Some(payload),
        Err(error) => {
            tracing::error!(%error, message_type = ?message.message_type(), "failed to encode server message");
            None
        }
    }
}

#[cfg(test)]
mod tests;
