use super::collision::{circles_overlap, CollisionDetector};
use super::constants::{
    COLLISION_VOTE_TIMEOUT_MS, COLOR_POOL, ENTRY_LENGTH_PER_STAKE, FOOD_CHECK_INTERVAL_MS,
    FOOD_QUERY_RADIUS_FACTOR, FOOD_RADIUS_OF_INTEREST, FRAME_MS, INITIAL_SEGMENT_COUNT,
    LEADERBOARD_SIZE, MAX_ENTRY_LENGTH, MINIMAP_UPDATE_INTERVAL_MS, SPAWN_CANDIDATES,
    SPAWN_WALL_MARGIN, WORLD_RADIUS,
};
use super::food::FoodField;
use super::math::{random_point_in_circle, Vec2};
use super::minimap::occupancy_grid;
use super::settlement::{settle_death, Settlement};
use super::snake::{Snake, SnakeInit};
use super::types::{DeathCause, DeathSource, EntityId, Food, FoodId, InputFrame};
use crate::protocol::{
    CompactSnake, GameStatePayload, InitialState, JoinAcceptedPayload, KillFeedPayload,
    LeaderboardEntry, MinimapPayload, PlayerDiedPayload, PlayerJoinedPayload, SnakeState,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};

pub const WALL_KILLER_NAME: &str = "Arena Wall";

#[derive(Debug, Clone, Copy)]
struct CollisionVote {
    reported_at: i64,
}

/// One confirmed death, everything the room needs to notify its sessions.
#[derive(Debug, Clone)]
pub struct DeathReport {
    pub victim_id: EntityId,
    pub victim_name: String,
    pub killer_name: Option<String>,
    pub cause: DeathCause,
    pub source: DeathSource,
    pub settlement: Settlement,
    pub death_foods: Vec<Food>,
    pub timestamp: i64,
}

impl DeathReport {
    pub fn kill_feed(&self) -> KillFeedPayload {
        let cash = if self.settlement.killer_reward > 0.0 {
            Some(self.settlement.killer_reward)
        } else if self.settlement.nearest_reward > 0.0 {
            Some(self.settlement.nearest_reward)
        } else {
            None
        };
        // An uncredited killer reads as a wall death.
        let (killer_name, method) = match &self.killer_name {
            Some(name) => (name.clone(), self.cause.method()),
            None => (WALL_KILLER_NAME.to_string(), DeathCause::Wall.method()),
        };
        KillFeedPayload {
            killer_name,
            victim_name: self.victim_name.clone(),
            method: method.to_string(),
            cash,
            timestamp: self.timestamp,
        }
    }

    pub fn player_died(&self) -> PlayerDiedPayload {
        PlayerDiedPayload {
            player_id: self.victim_id.clone(),
            death_foods: self.death_foods.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum WorldEvent {
    Death(DeathReport),
    /// Food newly inside one entity's area of interest.
    FoodOfInterest {
        player_id: EntityId,
        foods: Vec<Food>,
    },
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub accepted: JoinAcceptedPayload,
    pub joined: PlayerJoinedPayload,
}

#[derive(Debug, Default)]
pub struct TickOutput {
    pub snapshot: Option<GameStatePayload>,
    pub eaten_food: Vec<FoodId>,
}

pub fn entry_length(stake: f64) -> f64 {
    (stake * ENTRY_LENGTH_PER_STAKE)
        .floor()
        .clamp(INITIAL_SEGMENT_COUNT as f64, MAX_ENTRY_LENGTH)
}

pub fn snake_state(snake: &Snake) -> SnakeState {
    SnakeState {
        id: snake.id.clone(),
        username: snake.username.clone(),
        color: snake.color,
        segments: snake.segments.clone(),
        length: snake.segments.len() as u32,
        radius: snake.radius,
        is_boosting: snake.is_boosting,
        score: snake.score.max(0.0).floor() as u32,
        cash: snake.cash,
        is_spectator: snake.is_spectator,
    }
}

pub fn compact_snake(snake: &Snake) -> CompactSnake {
    let mut head = snake.head();
    head.angle = snake.angle();
    CompactSnake {
        id: snake.id.clone(),
        username: snake.username.clone(),
        color: snake.color,
        head,
        length: snake.length().max(0.0).floor() as u32,
        radius: snake.radius,
        is_boosting: snake.is_boosting,
        score: snake.score.max(0.0).floor() as u32,
        cash: snake.cash,
        is_spectator: snake.is_spectator,
    }
}

/// Authoritative simulation of one room. Pure state: no sockets, no clocks;
/// callers pass `dt` in 60 Hz frames and `now` in unix millis.
#[derive(Debug)]
pub struct GameWorld {
    snakes: HashMap<EntityId, Snake>,
    food: FoodField,
    detector: CollisionDetector,
    votes: HashMap<EntityId, CollisionVote>,
    dead_this_tick: HashSet<EntityId>,
    food_check_ms: f64,
    minimap_timer_ms: f64,
    events: Vec<WorldEvent>,
    spectator_username: Option<String>,
    rng: StdRng,
}

impl GameWorld {
    pub fn new(spectator_username: Option<String>) -> Self {
        let mut rng = StdRng::from_entropy();
        let food = FoodField::with_initial_population(&mut rng);
        Self {
            snakes: HashMap::new(),
            food,
            detector: CollisionDetector::default(),
            votes: HashMap::new(),
            dead_this_tick: HashSet::new(),
            food_check_ms: 0.0,
            minimap_timer_ms: 0.0,
            events: Vec::new(),
            spectator_username,
            rng,
        }
    }

    pub fn is_alive(&self, id: &str) -> bool {
        self.snakes.contains_key(id)
    }

    pub fn snake(&self, id: &str) -> Option<&Snake> {
        self.snakes.get(id)
    }

    pub fn snake_mut(&mut self, id: &str) -> Option<&mut Snake> {
        self.snakes.get_mut(id)
    }

    pub fn live_count(&self) -> usize {
        self.snakes.len()
    }

    pub fn food(&self) -> &FoodField {
        &self.food
    }

    pub fn food_mut(&mut self) -> &mut FoodField {
        &mut self.food
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    /// Best of `SPAWN_CANDIDATES` random points, maximising the distance to
    /// both the wall and every live head.
    fn safe_spawn_point(&mut self) -> Vec2 {
        if self.snakes.is_empty() {
            return Vec2::ZERO;
        }
        let mut best = Vec2::ZERO;
        let mut best_clearance = 0.0;
        for _ in 0..SPAWN_CANDIDATES {
            let candidate = random_point_in_circle(&mut self.rng, WORLD_RADIUS - SPAWN_WALL_MARGIN);
            let clearance = self
                .snakes
                .values()
                .map(|snake| snake.head_position().distance(candidate))
                .fold(WORLD_RADIUS - candidate.length(), f64::min);
            if clearance > best_clearance {
                best_clearance = clearance;
                best = candidate;
            }
        }
        best
    }

    /// Places a new entity for `id`. Returns `None` while `id` is still live.
    pub fn spawn_player(
        &mut self,
        id: &str,
        username: &str,
        stake: f64,
        rate: f64,
    ) -> Option<JoinOutcome> {
        if self.is_alive(id) {
            return None;
        }
        let cash = stake * rate;
        let cash = if cash.is_finite() { cash.max(0.0) } else { 0.0 };
        let is_spectator = self
            .spectator_username
            .as_deref()
            .is_some_and(|name| name == username);
        let position = self.safe_spawn_point();
        let angle = self.rng.gen::<f64>() * std::f64::consts::PI * 2.0;
        let color = COLOR_POOL[self.rng.gen_range(0..COLOR_POOL.len())];

        let mut snake = Snake::spawn(
            SnakeInit {
                id: id.to_string(),
                username: username.to_string(),
                color,
                position,
                angle,
                length: entry_length(stake),
                cash,
                is_spectator,
            },
            &mut self.rng,
        );

        let nearby: Vec<Food> = self
            .food
            .query_square(position, FOOD_RADIUS_OF_INTEREST)
            .into_iter()
            .cloned()
            .collect();
        snake.known_food.extend(nearby.iter().map(|food| food.id));

        let joined = PlayerJoinedPayload {
            snake: snake_state(&snake),
        };
        self.votes.remove(id);
        self.snakes.insert(id.to_string(), snake);

        let initial_state = InitialState {
            snakes: self.snakes.values().map(snake_state).collect(),
            foods: nearby,
            leaderboard: self.leaderboard(),
            last_processed_input: self.last_processed_inputs(),
        };
        tracing::info!(
            player_id = id,
            username,
            stake,
            rate,
            cash,
            is_spectator,
            "player spawned"
        );
        Some(JoinOutcome {
            accepted: JoinAcceptedPayload {
                player_id: id.to_string(),
                initial_state,
                color,
                starting_cash: cash,
            },
            joined,
        })
    }

    pub fn enqueue_input(&mut self, id: &str, input: InputFrame) -> bool {
        match self.snakes.get_mut(id) {
            Some(snake) => {
                snake.pending_inputs.push_back(input);
                true
            }
            None => false,
        }
    }

    /// Disconnect path: leaves the live set without settlement and cancels any
    /// pending vote for the entity.
    pub fn remove_player(&mut self, id: &str) -> bool {
        self.votes.remove(id);
        self.dead_this_tick.insert(id.to_string());
        self.snakes.remove(id).is_some()
    }

    /// Optimistic client report. Only the victim or the named killer may
    /// report, `victim == killer` encodes a wall death, and a repeat inside the
    /// vote window is dropped.
    pub fn process_collision_report(
        &mut self,
        reporter: &str,
        victim_id: &str,
        killer_id: &str,
        now: i64,
    ) -> bool {
        if reporter != victim_id && reporter != killer_id {
            tracing::debug!(reporter, victim_id, killer_id, "ignoring third-party collision report");
            return false;
        }
        if let Some(vote) = self.votes.get(victim_id) {
            if now - vote.reported_at <= COLLISION_VOTE_TIMEOUT_MS {
                return false;
            }
        }
        let Some(victim) = self.snakes.get(victim_id) else {
            return false;
        };
        if victim.is_spectator {
            return false;
        }
        self.votes
            .insert(victim_id.to_string(), CollisionVote { reported_at: now });

        if victim_id == killer_id {
            self.confirm_and_process_death(victim_id, DeathCause::Wall, None, DeathSource::ClientReport, now)
        } else {
            self.confirm_and_process_death(
                victim_id,
                DeathCause::Collision,
                Some(killer_id),
                DeathSource::ClientReport,
                now,
            )
        }
    }

    /// Single commit point for every death. Returns false when the victim has
    /// already left the live set, which makes repeated calls harmless.
    pub fn confirm_and_process_death(
        &mut self,
        victim_id: &str,
        cause: DeathCause,
        killer_id: Option<&str>,
        source: DeathSource,
        now: i64,
    ) -> bool {
        if !self.snakes.contains_key(victim_id) {
            return false;
        }
        let settlement = settle_death(&mut self.snakes, victim_id, killer_id);
        let killer_name = settlement
            .killer_id
            .as_deref()
            .and_then(|id| self.snakes.get(id))
            .map(|killer| killer.username.clone());
        let Some(victim) = self.snakes.remove(victim_id) else {
            return false;
        };
        self.dead_this_tick.insert(victim_id.to_string());
        self.votes.remove(victim_id);

        let death_foods = self.food.spawn_death_burst(&victim, &mut self.rng);
        for snake in self.snakes.values_mut() {
            snake.known_food.extend(death_foods.iter().map(|food| food.id));
        }
        tracing::info!(
            victim = %victim.id,
            killer = ?settlement.killer_id,
            cause = cause.as_str(),
            ?source,
            forfeited = settlement.victim_cash,
            reward = settlement.payout(),
            recipient = ?settlement.recipient(),
            "death confirmed"
        );

        self.events.push(WorldEvent::Death(DeathReport {
            victim_id: victim.id,
            victim_name: victim.username,
            killer_name,
            cause,
            source,
            settlement,
            death_foods,
            timestamp: now,
        }));
        true
    }

    pub fn tick(&mut self, dt: f64, now: i64) -> TickOutput {
        self.dead_this_tick.clear();
        let elapsed_ms = dt * FRAME_MS;
        self.minimap_timer_ms -= elapsed_ms;

        self.integrate(dt);
        self.detector.rebuild(self.snakes.values());
        self.collision_pass(now);
        let eaten_food = self.food_pass();

        self.food_check_ms += elapsed_ms;
        if self.food_check_ms >= FOOD_CHECK_INTERVAL_MS {
            self.push_food_of_interest();
            self.food_check_ms = 0.0;
        }

        self.votes
            .retain(|_, vote| now - vote.reported_at <= COLLISION_VOTE_TIMEOUT_MS);

        TickOutput {
            snapshot: self.snapshot(),
            eaten_food,
        }
    }

    fn integrate(&mut self, dt: f64) {
        for snake in self.snakes.values_mut() {
            snake.drain_inputs();
            match snake.update(dt, &mut self.rng) {
                Ok(Some(drop)) => {
                    self.food.spawn_at(drop.position, drop.value);
                }
                Ok(None) => {}
                Err(fault) => {
                    tracing::warn!(player_id = %snake.id, %fault, "physics step skipped");
                }
            }
        }
    }

    fn collision_pass(&mut self, now: i64) {
        let ids: Vec<EntityId> = self.snakes.keys().cloned().collect();
        for id in ids {
            if self.dead_this_tick.contains(&id) {
                continue;
            }
            let Some(snake) = self.snakes.get(&id) else { continue };

            if CollisionDetector::check_wall(snake) {
                self.confirm_and_process_death(&id, DeathCause::Wall, None, DeathSource::ServerCheck, now);
                continue;
            }

            let snakes = &self.snakes;
            let dead = &self.dead_this_tick;
            let hit = self
                .detector
                .check_snake(snake, |other| snakes.contains_key(other) && !dead.contains(other));
            if let Some(hit) = hit {
                if self.dead_this_tick.contains(&hit.victim) {
                    continue;
                }
                let cause = if hit.head_on {
                    DeathCause::HeadOn
                } else {
                    DeathCause::Collision
                };
                self.confirm_and_process_death(
                    &hit.victim,
                    cause,
                    Some(&hit.killer),
                    DeathSource::ServerCheck,
                    now,
                );
            }
        }
    }

    fn food_pass(&mut self) -> Vec<FoodId> {
        let mut eaten = Vec::new();
        for snake in self.snakes.values_mut() {
            if snake.is_spectator {
                continue;
            }
            let head = snake.head_position();
            let hits: Vec<FoodId> = self
                .food
                .query_square(head, snake.radius * FOOD_QUERY_RADIUS_FACTOR)
                .into_iter()
                .filter(|food| circles_overlap(head, snake.radius, food.position(), food.radius))
                .map(|food| food.id)
                .collect();
            for id in hits {
                if let Some(consumed) = self.food.consume(id, Some(head), &mut self.rng) {
                    snake.grow(consumed.eaten.value);
                    eaten.push(id);
                }
            }
        }
        if !eaten.is_empty() {
            for snake in self.snakes.values_mut() {
                for id in &eaten {
                    snake.known_food.remove(id);
                }
            }
        }
        eaten
    }

    fn push_food_of_interest(&mut self) {
        for snake in self.snakes.values_mut() {
            let half_extent = if snake.is_boosting {
                FOOD_RADIUS_OF_INTEREST
            } else {
                FOOD_RADIUS_OF_INTEREST * 2.0
            };
            let fresh: Vec<Food> = self
                .food
                .query_square(snake.head_position(), half_extent)
                .into_iter()
                .filter(|food| !snake.known_food.contains(&food.id))
                .cloned()
                .collect();
            if fresh.is_empty() {
                continue;
            }
            snake.known_food.extend(fresh.iter().map(|food| food.id));
            self.events.push(WorldEvent::FoodOfInterest {
                player_id: snake.id.clone(),
                foods: fresh,
            });
        }
    }

    fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut ranked: Vec<&Snake> = self.snakes.values().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        ranked
            .into_iter()
            .take(LEADERBOARD_SIZE)
            .map(|snake| LeaderboardEntry {
                id: snake.id.clone(),
                username: snake.username.clone(),
                score: snake.score.max(0.0).floor() as u32,
                cash: snake.cash,
            })
            .collect()
    }

    fn last_processed_inputs(&self) -> HashMap<String, u32> {
        self.snakes
            .values()
            .map(|snake| (snake.id.clone(), snake.last_processed_input))
            .collect()
    }

    /// Head-only state for every live entity; the minimap rides along once
    /// per `MINIMAP_UPDATE_INTERVAL_MS`.
    pub fn snapshot(&mut self) -> Option<GameStatePayload> {
        if self.snakes.is_empty() {
            return None;
        }
        let minimap = if self.minimap_timer_ms <= 0.0 {
            self.minimap_timer_ms = MINIMAP_UPDATE_INTERVAL_MS;
            Some(MinimapPayload {
                grid: occupancy_grid(self.snakes.values()),
            })
        } else {
            None
        };
        Some(GameStatePayload {
            snakes: self.snakes.values().map(compact_snake).collect(),
            leaderboard: self.leaderboard(),
            last_processed_input: self.last_processed_inputs(),
            total_players: self.snakes.len(),
            minimap,
        })
    }
}
