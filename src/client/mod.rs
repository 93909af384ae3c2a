//! Predicting client: keeps a local copy of the room between snapshots,
//! reports its own deaths immediately and optimistically kills other
//! entities it sees crash, rolling them back when the server disagrees.

pub mod collision;
pub mod food_physics;
pub mod mirror;
pub mod pool;
pub mod prediction;

use crate::game::food::FoodField;
use crate::game::math::Vec2;
use crate::game::snake::{Snake, SnakeInit};
use crate::game::types::{EntityId, Food, InputFrame, Segment};
use crate::protocol::{
    ClientMessage, CollisionReportPayload, CompactSnake, GameStatePayload, InputPayload,
    JoinAcceptedPayload, JoinPayload, KillFeedPayload, LeaderboardEntry, MinimapPayload,
    PlayerDiedPayload, ServerMessage, SnakeState, TimePayload,
};
use collision::{hits_local_wall, LocalCollisionManager};
use food_physics::{Attractor, FoodPhysics};
use mirror::RemoteSnake;
use prediction::{LifeState, RollbackTracker};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, VecDeque};

const KILL_FEED_LENGTH: usize = 5;

pub struct PredictionClient {
    me: Option<EntityId>,
    player: Option<Snake>,
    player_collided: bool,
    pending_inputs: VecDeque<InputFrame>,
    next_sequence: u32,
    remotes: HashMap<EntityId, RemoteSnake>,
    food: FoodField,
    food_physics: FoodPhysics,
    collisions: LocalCollisionManager,
    rollback: RollbackTracker,
    outbox: Vec<ClientMessage>,
    kill_feed: VecDeque<KillFeedPayload>,
    leaderboard: Vec<LeaderboardEntry>,
    minimap: Option<MinimapPayload>,
    latency_ms: Option<f64>,
    rng: StdRng,
}

impl Default for PredictionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionClient {
    pub fn new() -> Self {
        Self {
            me: None,
            player: None,
            player_collided: false,
            pending_inputs: VecDeque::new(),
            next_sequence: 0,
            remotes: HashMap::new(),
            food: FoodField::new(),
            food_physics: FoodPhysics::new(),
            collisions: LocalCollisionManager::default(),
            rollback: RollbackTracker::new(),
            outbox: Vec::new(),
            kill_feed: VecDeque::new(),
            leaderboard: Vec::new(),
            minimap: None,
            latency_ms: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn me(&self) -> Option<&str> {
        self.me.as_deref()
    }

    pub fn player(&self) -> Option<&Snake> {
        self.player.as_ref()
    }

    pub fn is_collided(&self) -> bool {
        self.player_collided
    }

    pub fn remote(&self, id: &str) -> Option<&RemoteSnake> {
        self.remotes.get(id)
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    pub fn life_state(&self, id: &str) -> LifeState {
        self.rollback.state(id)
    }

    pub fn food(&self) -> &FoodField {
        &self.food
    }

    pub fn food_physics(&self) -> &FoodPhysics {
        &self.food_physics
    }

    pub fn kill_feed(&self) -> impl Iterator<Item = &KillFeedPayload> {
        self.kill_feed.iter()
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    pub fn minimap(&self) -> Option<&MinimapPayload> {
        self.minimap.as_ref()
    }

    pub fn latency_ms(&self) -> Option<f64> {
        self.latency_ms
    }

    pub fn pending_input_count(&self) -> usize {
        self.pending_inputs.len()
    }

    /// Messages queued for the server since the last drain.
    pub fn drain_outbox(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }

    pub fn join(&mut self, username: &str, stake_amount: f64) {
        self.outbox.push(ClientMessage::Join(JoinPayload {
            username: username.to_string(),
            stake_amount,
        }));
    }

    pub fn ping(&mut self, now_ms: i64) {
        self.outbox.push(ClientMessage::Ping(TimePayload {
            time: now_ms as f64,
        }));
    }

    /// Steers the predicted avatar right away and queues the input for the
    /// server with the next sequence number.
    pub fn send_input(&mut self, target_angle: f64, is_boosting: bool) {
        if !target_angle.is_finite() {
            return;
        }
        self.next_sequence = self.next_sequence.wrapping_add(1);
        let input = InputFrame {
            target_angle,
            is_boosting,
            sequence: self.next_sequence,
        };
        if let Some(player) = self.player.as_mut() {
            player.apply_input(&input);
        }
        self.pending_inputs.push_back(input);
        self.outbox.push(ClientMessage::Input(InputPayload {
            target_angle,
            is_boosting,
            sequence: input.sequence,
        }));
    }

    pub fn handle_server_message(&mut self, message: ServerMessage, now_ms: i64) {
        match message {
            ServerMessage::JoinAccepted(payload) => self.on_join_accepted(payload),
            ServerMessage::GameState(payload) => self.on_game_state(payload),
            ServerMessage::PlayerDied(payload) => self.on_player_died(payload),
            ServerMessage::FoodSpawned(payload) => {
                for food in payload.foods {
                    self.food.upsert(food);
                }
            }
            ServerMessage::FoodEaten(payload) => {
                for id in payload.food_ids {
                    self.food.remove(id);
                    self.food_physics.cancel(id);
                }
            }
            ServerMessage::PlayerJoined(payload) => {
                if self.me.as_deref() != Some(payload.snake.id.as_str()) {
                    self.rollback.forget(&payload.snake.id);
                    self.remotes
                        .insert(payload.snake.id.clone(), RemoteSnake::from_state(&payload.snake));
                }
            }
            ServerMessage::KillFeed(payload) => {
                self.kill_feed.push_back(payload);
                while self.kill_feed.len() > KILL_FEED_LENGTH {
                    self.kill_feed.pop_front();
                }
            }
            ServerMessage::Pong(payload) => {
                self.latency_ms = Some((now_ms as f64 - payload.time).max(0.0));
            }
        }
    }

    fn on_join_accepted(&mut self, payload: JoinAcceptedPayload) {
        let me = payload.player_id;
        self.player = None;
        self.player_collided = false;
        self.pending_inputs.clear();
        self.rollback.forget(&me);

        for state in &payload.initial_state.snakes {
            if state.id == me {
                self.player = Some(own_snake(state, &mut self.rng));
            } else {
                self.rollback.forget(&state.id);
                self.remotes.insert(state.id.clone(), RemoteSnake::from_state(state));
            }
        }
        for food in payload.initial_state.foods {
            self.food.upsert(food);
        }
        self.leaderboard = payload.initial_state.leaderboard;
        tracing::debug!(player_id = %me, remotes = self.remotes.len(), "joined room");
        self.me = Some(me);
    }

    fn on_game_state(&mut self, payload: GameStatePayload) {
        if let Some(me) = self.me.clone() {
            if let Some(processed) = payload.last_processed_input.get(&me) {
                while self
                    .pending_inputs
                    .front()
                    .is_some_and(|input| input.sequence <= *processed)
                {
                    self.pending_inputs.pop_front();
                }
            }
            if let Some(own) = payload.snakes.iter().find(|snake| snake.id == me) {
                self.reconcile_player(own);
            }
        }

        let mut seen = Vec::with_capacity(payload.snakes.len());
        for compact in &payload.snakes {
            if self.me.as_deref() == Some(compact.id.as_str()) {
                continue;
            }
            seen.push(compact.id.clone());
            match self.remotes.get_mut(&compact.id) {
                Some(remote) => remote.apply_compact(compact, 1.0),
                None => {
                    self.rollback.forget(&compact.id);
                    self.remotes
                        .insert(compact.id.clone(), RemoteSnake::from_compact(compact));
                }
            }
        }
        let gone: Vec<EntityId> = self
            .remotes
            .keys()
            .filter(|id| !seen.contains(id))
            .cloned()
            .collect();
        for id in gone {
            self.remotes.remove(&id);
            self.rollback.forget(&id);
        }

        self.leaderboard = payload.leaderboard;
        if payload.minimap.is_some() {
            self.minimap = payload.minimap;
        }
    }

    /// Snaps the predicted head to the server's and replays the inputs the
    /// server has not processed yet.
    fn reconcile_player(&mut self, own: &CompactSnake) {
        if self.player_collided {
            return;
        }
        let Some(player) = self.player.as_mut() else {
            return;
        };
        let mut segments = player.segments.clone();
        segments[0] = own.head;
        player.restore_pose(segments, own.head.angle);
        player.set_true_length(f64::from(own.length));
        player.radius = own.radius;
        player.score = f64::from(own.score);
        player.cash = own.cash;
        for input in &self.pending_inputs {
            player.apply_input(input);
        }
    }

    fn on_player_died(&mut self, payload: PlayerDiedPayload) {
        if self.me.as_deref() == Some(payload.player_id.as_str()) {
            tracing::debug!(player_id = %payload.player_id, "own death confirmed");
            self.player = None;
            self.player_collided = false;
            self.pending_inputs.clear();
            self.rollback.confirm_death(&payload.player_id);
        } else {
            self.rollback.confirm_death(&payload.player_id);
            self.remotes.remove(&payload.player_id);
        }
        for food in payload.death_foods {
            self.food.upsert(food);
        }
    }

    /// One local frame: own physics, local collision checks, rollback sweep
    /// and food homing. Returns the items that finished homing this frame.
    pub fn step(&mut self, dt: f64, now_ms: i64) -> Vec<Food> {
        if let Some(player) = self.player.as_mut() {
            if !self.player_collided {
                if let Err(fault) = player.update(dt, &mut self.rng) {
                    tracing::warn!(?fault, "local physics step skipped");
                }
            }
        }

        self.check_own_wall(now_ms);
        self.check_collisions(now_ms);
        let me = self.me.clone();
        let rolled_back = self.rollback.sweep(now_ms, me.as_deref(), &mut self.remotes);
        if !rolled_back.is_empty() {
            tracing::debug!(count = rolled_back.len(), "rolled back optimistic deaths");
        }

        let attractors = self.attractors();
        self.food_physics.update(&attractors, &mut self.food, dt)
    }

    fn check_own_wall(&mut self, now_ms: i64) {
        let (Some(me), Some(player)) = (self.me.clone(), self.player.as_ref()) else {
            return;
        };
        if self.player_collided || player.is_spectator {
            return;
        }
        if hits_local_wall(player.head_position(), player.radius) {
            self.player_collided = true;
            self.report(&me, &me, now_ms);
        }
    }

    fn check_collisions(&mut self, now_ms: i64) {
        let (Some(me), Some(player)) = (self.me.clone(), self.player.as_ref()) else {
            return;
        };
        let hits = self
            .collisions
            .update(now_ms, player, self.player_collided, &self.remotes);

        for hit in hits {
            if hit.victim == me {
                if !self.player_collided {
                    self.player_collided = true;
                    self.report(&me, &hit.killer, now_ms);
                }
                continue;
            }
            if self.rollback.has_recent_report(&hit.victim, now_ms) {
                continue;
            }
            let Some(remote) = self.remotes.get_mut(&hit.victim) else {
                continue;
            };
            if self.rollback.mark_optimistic(remote, now_ms) {
                self.report(&hit.victim, &hit.killer, now_ms);
            }
        }
    }

    fn report(&mut self, victim: &str, killer: &str, now_ms: i64) {
        self.rollback.record_report(victim, killer, now_ms);
        self.outbox
            .push(ClientMessage::CollisionReport(CollisionReportPayload {
                victim_id: victim.to_string(),
                killer_id: killer.to_string(),
            }));
    }

    fn attractors(&self) -> Vec<Attractor> {
        let own = self
            .player
            .as_ref()
            .filter(|_| !self.player_collided)
            .map(|player| Attractor {
                id: player.id.clone(),
                head: player.head_position(),
                radius: player.radius,
                angle: player.angle(),
                is_boosting: player.is_boosting,
                is_spectator: player.is_spectator,
            });
        let others = self
            .remotes
            .values()
            .filter(|remote| !remote.collided)
            .map(|remote| Attractor {
                id: remote.id.clone(),
                head: remote.head_position(),
                radius: remote.radius,
                angle: remote.angle(),
                is_boosting: remote.is_boosting,
                is_spectator: remote.is_spectator,
            });
        own.into_iter().chain(others).collect()
    }
}

fn own_snake(state: &SnakeState, rng: &mut StdRng) -> Snake {
    let head = state
        .segments
        .first()
        .copied()
        .unwrap_or_else(|| Segment::new(Vec2::ZERO, 0.0));
    let mut snake = Snake::spawn(
        SnakeInit {
            id: state.id.clone(),
            username: state.username.clone(),
            color: state.color,
            position: head.position(),
            angle: head.angle,
            length: f64::from(state.length),
            cash: state.cash,
            is_spectator: state.is_spectator,
        },
        rng,
    );
    snake.restore_pose(state.segments.clone(), head.angle);
    snake.radius = state.radius;
    snake
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::client::COLLISION_TIMEOUT_MS;
    use crate::game::constants::WORLD_RADIUS;
    use crate::game::world::{compact_snake, GameWorld};
    use std::f64::consts::PI;

    fn joined_client() -> (PredictionClient, GameWorld) {
        let mut world = GameWorld::new(None);
        let outcome = world.spawn_player("me", "Me", 0.02, 1.0).unwrap();
        let mut client = PredictionClient::new();
        client.join("Me", 0.02);
        client.handle_server_message(ServerMessage::JoinAccepted(outcome.accepted), 0);
        client.drain_outbox();
        (client, world)
    }

    fn line(head: Vec2, angle: f64, count: usize) -> Vec<Segment> {
        (0..count)
            .map(|index| Segment::new(head + Vec2::from_angle(angle + PI, 5.0 * index as f64), angle))
            .collect()
    }

    fn place_player(client: &mut PredictionClient, head: Vec2, angle: f64) {
        let player = client.player.as_mut().unwrap();
        let count = player.segments.len();
        player.restore_pose(line(head, angle, count), angle);
    }

    fn add_remote(client: &mut PredictionClient, id: &str, head: Vec2, angle: f64, length: u32) {
        let remote = RemoteSnake::from_state(&SnakeState {
            id: id.to_string(),
            username: id.to_string(),
            color: 0,
            segments: line(head, angle, length as usize),
            length,
            radius: 10.0,
            is_boosting: false,
            score: length * 2,
            cash: 1.0,
            is_spectator: false,
        });
        client.remotes.insert(id.to_string(), remote);
    }

    fn reports(messages: &[ClientMessage]) -> Vec<(String, String)> {
        messages
            .iter()
            .filter_map(|message| match message {
                ClientMessage::CollisionReport(report) => {
                    Some((report.victim_id.clone(), report.killer_id.clone()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn join_accepted_builds_local_state() {
        let mut world = GameWorld::new(None);
        let outcome = world.spawn_player("me", "Me", 0.02, 1.0).unwrap();
        let food_count = outcome.accepted.initial_state.foods.len();
        let mut client = PredictionClient::new();

        client.handle_server_message(ServerMessage::JoinAccepted(outcome.accepted), 0);

        assert_eq!(client.me(), Some("me"));
        assert_eq!(client.player().unwrap().id, "me");
        assert_eq!(client.remote_count(), 0);
        assert_eq!(client.food().len(), food_count);
    }

    #[test]
    fn processed_inputs_are_pruned_on_snapshot() {
        let (mut client, mut world) = joined_client();
        for _ in 0..3 {
            client.send_input(0.5, false);
        }
        assert_eq!(client.pending_input_count(), 3);
        assert_eq!(client.drain_outbox().len(), 3);

        let mut snapshot = world.snapshot().unwrap();
        snapshot.last_processed_input.insert("me".to_string(), 2);
        client.handle_server_message(ServerMessage::GameState(snapshot), 0);

        assert_eq!(client.pending_input_count(), 1);
        assert_eq!(client.pending_inputs[0].sequence, 3);
    }

    #[test]
    fn snapshot_tracks_remote_entities() {
        let (mut client, mut world) = joined_client();
        world.spawn_player("other", "Other", 0.02, 1.0).unwrap();
        let snapshot = world.snapshot().unwrap();
        client.handle_server_message(ServerMessage::GameState(snapshot), 0);
        assert!(client.remote("other").is_some());

        world.remove_player("other");
        let snapshot = world.snapshot().unwrap();
        client.handle_server_message(ServerMessage::GameState(snapshot), 0);
        assert!(client.remote("other").is_none());
    }

    #[test]
    fn own_wall_contact_reports_self_death_once() {
        let (mut client, _world) = joined_client();
        place_player(&mut client, Vec2::new(WORLD_RADIUS - 5.0, 0.0), 0.0);

        client.step(1.0, 100);
        client.step(1.0, 200);

        assert!(client.is_collided());
        assert_eq!(
            reports(&client.drain_outbox()),
            vec![("me".to_string(), "me".to_string())]
        );
    }

    #[test]
    fn unconfirmed_remote_death_is_rolled_back() {
        let (mut client, _world) = joined_client();
        client.player.as_mut().unwrap().set_true_length(30.0);
        place_player(&mut client, Vec2::ZERO, 0.0);
        add_remote(&mut client, "them", Vec2::new(12.0, 0.0), PI, 10);
        let original = client.remote("them").unwrap().segments.clone();

        client.step(0.0, 0);
        assert!(client.remote("them").unwrap().collided);
        assert_eq!(
            reports(&client.drain_outbox()),
            vec![("them".to_string(), "me".to_string())]
        );

        place_player(&mut client, Vec2::new(-300.0, 0.0), PI);
        client.step(0.0, COLLISION_TIMEOUT_MS + 1);

        let remote = client.remote("them").unwrap();
        assert!(!remote.collided);
        assert_eq!(remote.segments, original);
        assert_eq!(client.life_state("them"), LifeState::Alive);
    }

    #[test]
    fn confirmed_remote_death_removes_entity() {
        let (mut client, _world) = joined_client();
        client.player.as_mut().unwrap().set_true_length(30.0);
        place_player(&mut client, Vec2::ZERO, 0.0);
        add_remote(&mut client, "them", Vec2::new(12.0, 0.0), PI, 10);
        client.step(0.0, 0);

        client.handle_server_message(
            ServerMessage::PlayerDied(PlayerDiedPayload {
                player_id: "them".to_string(),
                death_foods: Vec::new(),
            }),
            50,
        );
        client.step(0.0, COLLISION_TIMEOUT_MS + 1);

        assert!(client.remote("them").is_none());
        assert_eq!(client.life_state("them"), LifeState::ConfirmedDead);
    }

    #[test]
    fn snapshot_does_not_move_frozen_remote() {
        let (mut client, mut world) = joined_client();
        world.spawn_player("other", "Other", 0.02, 1.0).unwrap();
        client.handle_server_message(ServerMessage::GameState(world.snapshot().unwrap()), 0);
        client.remotes.get_mut("other").unwrap().collided = true;
        let before = client.remote("other").unwrap().segments.clone();

        let mut moved = compact_snake(world.snake("other").unwrap());
        moved.head.x += 40.0;
        let mut snapshot = world.snapshot().unwrap();
        snapshot.snakes.retain(|snake| snake.id != "other");
        snapshot.snakes.push(moved);
        client.handle_server_message(ServerMessage::GameState(snapshot), 10);

        assert_eq!(client.remote("other").unwrap().segments, before);
    }

    #[test]
    fn kill_feed_keeps_latest_entries() {
        let mut client = PredictionClient::new();
        for index in 0..7 {
            client.handle_server_message(
                ServerMessage::KillFeed(KillFeedPayload {
                    killer_name: "a".to_string(),
                    victim_name: format!("v{index}"),
                    method: "snake".to_string(),
                    cash: None,
                    timestamp: index,
                }),
                0,
            );
        }
        let names: Vec<&str> = client.kill_feed().map(|entry| entry.victim_name.as_str()).collect();
        assert_eq!(names, vec!["v2", "v3", "v4", "v5", "v6"]);
    }

    #[test]
    fn pong_measures_round_trip() {
        let mut client = PredictionClient::new();
        client.ping(1_000);
        assert_eq!(client.drain_outbox().len(), 1);
        client.handle_server_message(ServerMessage::Pong(TimePayload { time: 1_000.0 }), 1_045);
        assert_eq!(client.latency_ms(), Some(45.0));
    }
}
