use super::constants::{
    BASE_SEGMENT_RADIUS, BASE_SPEED, BOOST_LENGTH_TO_DROP_MAX, BOOST_LENGTH_TO_DROP_MIN,
    BOOST_SPEED_MULTIPLIER, GROWTH_ANIMATION_SPEED, GROWTH_FACTOR, INITIAL_SEGMENT_COUNT,
    LENGTH_DRAIN_RATE_PER_TICK, MAX_GROWTH_LENGTH, MIN_BOOST_LENGTH, RADIUS_GROWTH_OFFSET,
    SCORE_PER_LENGTH_UNIT, SEGMENT_GROWTH_MULTIPLIER, SEGMENT_LERP_FACTOR, SEGMENT_TURN_FACTOR,
    SEGMENT_TURN_FACTOR_MAX, TARGET_DISTANCE, TURN_SPEED,
};
use super::math::{angle_difference, clamp, normalize_angle, Vec2};
use super::types::{EntityId, FoodId, InputFrame, Segment};
use rand::Rng;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsFault {
    #[error("non-finite delta time {0}")]
    InvalidDelta(f64),
    #[error("non-finite {field} after physics step")]
    NonFinite { field: &'static str },
}

/// Everything needed to place a new entity in the world.
#[derive(Debug, Clone)]
pub struct SnakeInit {
    pub id: EntityId,
    pub username: String,
    pub color: u32,
    pub position: Vec2,
    pub angle: f64,
    pub length: f64,
    pub cash: f64,
    pub is_spectator: bool,
}

/// A pellet shed from the tail while boosting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostDrop {
    pub position: Vec2,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct Snake {
    pub id: EntityId,
    pub username: String,
    pub color: u32,
    pub segments: Vec<Segment>,
    pub radius: f64,
    pub score: f64,
    pub is_boosting: bool,
    pub cash: f64,
    pub kills: u32,
    pub is_spectator: bool,
    pub last_processed_input: u32,
    pub pending_inputs: VecDeque<InputFrame>,
    pub known_food: HashSet<FoodId>,
    target: Vec2,
    angle: f64,
    speed: f64,
    true_length: f64,
    visual_length: f64,
    drained_since_drop: f64,
    next_drop_threshold: f64,
}

pub fn radius_for_length(length: f64) -> f64 {
    let growth = (length - RADIUS_GROWTH_OFFSET).min(MAX_GROWTH_LENGTH) * GROWTH_FACTOR;
    BASE_SEGMENT_RADIUS * (1.0 + growth)
}

pub fn segment_count_for(visual_length: f64) -> usize {
    (visual_length.ceil().max(0.0) as usize).max(INITIAL_SEGMENT_COUNT)
}

/// Lerp-follow chain step shared by the server simulation and the client mirror.
///
/// Index 0 is never touched; every other segment eases toward its leader.
pub fn follow_chain(segments: &mut [Segment], speed: f64, dt: f64) {
    let speed_ratio = speed / BASE_SPEED;
    let factor = (SEGMENT_LERP_FACTOR * (1.0 + (speed_ratio - 1.0) * 0.5) * dt).min(1.0);
    let turn_factor = (SEGMENT_TURN_FACTOR * dt).min(SEGMENT_TURN_FACTOR_MAX);

    for index in 1..segments.len() {
        let leader = segments[index - 1];
        let current = &mut segments[index];
        current.x += (leader.x - current.x) * factor;
        current.y += (leader.y - current.y) * factor;

        let dx = leader.x - current.x;
        let dy = leader.y - current.y;
        if dx.abs() > 0.1 || dy.abs() > 0.1 {
            let diff = angle_difference(current.angle, dy.atan2(dx));
            current.angle += diff * turn_factor;
        }
    }
}

/// Grows or shrinks the chain to `target` entries by cloning the tail.
pub fn resize_chain(segments: &mut Vec<Segment>, target: usize) {
    while segments.len() < target {
        let Some(tail) = segments.last().copied() else { break };
        segments.push(tail);
    }
    while segments.len() > target && segments.len() > INITIAL_SEGMENT_COUNT {
        segments.pop();
    }
}

/// Everything `Snake::update` mutates.
struct StepCheckpoint {
    segments: Vec<Segment>,
    angle: f64,
    speed: f64,
    radius: f64,
    score: f64,
    is_boosting: bool,
    true_length: f64,
    visual_length: f64,
    drained_since_drop: f64,
    next_drop_threshold: f64,
}

impl StepCheckpoint {
    fn capture(snake: &Snake) -> Self {
        Self {
            segments: snake.segments.clone(),
            angle: snake.angle,
            speed: snake.speed,
            radius: snake.radius,
            score: snake.score,
            is_boosting: snake.is_boosting,
            true_length: snake.true_length,
            visual_length: snake.visual_length,
            drained_since_drop: snake.drained_since_drop,
            next_drop_threshold: snake.next_drop_threshold,
        }
    }

    fn restore(self, snake: &mut Snake) {
        snake.segments = self.segments;
        snake.angle = self.angle;
        snake.speed = self.speed;
        snake.radius = self.radius;
        snake.score = self.score;
        snake.is_boosting = self.is_boosting;
        snake.true_length = self.true_length;
        snake.visual_length = self.visual_length;
        snake.drained_since_drop = self.drained_since_drop;
        snake.next_drop_threshold = self.next_drop_threshold;
    }
}

fn random_drop_threshold(rng: &mut impl Rng) -> f64 {
    rng.gen_range(BOOST_LENGTH_TO_DROP_MIN..BOOST_LENGTH_TO_DROP_MAX)
}

impl Snake {
    pub fn spawn(init: SnakeInit, rng: &mut impl Rng) -> Self {
        let length = init.length.max(INITIAL_SEGMENT_COUNT as f64);
        let head = Segment::new(init.position, init.angle);
        let count = segment_count_for(length);
        Self {
            id: init.id,
            username: init.username,
            color: init.color,
            segments: vec![head; count],
            radius: radius_for_length(length),
            score: length * SCORE_PER_LENGTH_UNIT,
            is_boosting: false,
            cash: init.cash,
            kills: 0,
            is_spectator: init.is_spectator,
            last_processed_input: 0,
            pending_inputs: VecDeque::new(),
            known_food: HashSet::new(),
            target: init.position,
            angle: normalize_angle(init.angle),
            speed: BASE_SPEED,
            true_length: length,
            visual_length: length,
            drained_since_drop: 0.0,
            next_drop_threshold: random_drop_threshold(rng),
        }
    }

    pub fn head(&self) -> Segment {
        self.segments[0]
    }

    pub fn head_position(&self) -> Vec2 {
        self.segments[0].position()
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn length(&self) -> f64 {
        self.true_length
    }

    pub fn visual_length(&self) -> f64 {
        self.visual_length
    }

    pub fn set_true_length(&mut self, length: f64) {
        self.true_length = length;
    }

    /// Puts the chain and heading back exactly as given. The steering target
    /// is re-aimed along the heading so the next step keeps going straight.
    pub fn restore_pose(&mut self, segments: Vec<Segment>, angle: f64) {
        if segments.is_empty() {
            return;
        }
        self.segments = segments;
        self.angle = normalize_angle(angle);
        self.segments[0].angle = self.angle;
        self.target = self.head_position() + Vec2::from_angle(self.angle, TARGET_DISTANCE);
    }

    /// Points the steering target `TARGET_DISTANCE` ahead along the requested
    /// angle and toggles boost when the entity is long enough.
    pub fn apply_input(&mut self, input: &InputFrame) {
        if input.target_angle.is_finite() {
            self.target = self.head_position() + Vec2::from_angle(input.target_angle, TARGET_DISTANCE);
        }
        if input.is_boosting && self.true_length >= MIN_BOOST_LENGTH {
            self.is_boosting = true;
            self.speed = BASE_SPEED * BOOST_SPEED_MULTIPLIER;
        } else {
            self.is_boosting = false;
            self.speed = BASE_SPEED;
        }
    }

    /// Applies every queued input in arrival order and advances the watermark.
    pub fn drain_inputs(&mut self) {
        while let Some(input) = self.pending_inputs.pop_front() {
            self.apply_input(&input);
            if input.sequence > 0 {
                self.last_processed_input = input.sequence;
            }
        }
    }

    /// One physics step. On a fault every field the step touches is left as
    /// it was before the call.
    pub fn update(
        &mut self,
        dt: f64,
        rng: &mut impl Rng,
    ) -> Result<Option<BoostDrop>, PhysicsFault> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(PhysicsFault::InvalidDelta(dt));
        }
        let checkpoint = StepCheckpoint::capture(self);

        if self.is_boosting && self.true_length < MIN_BOOST_LENGTH {
            self.stop_boost();
        }

        self.steer_head(dt);
        follow_chain(&mut self.segments, self.speed, dt);

        let mut drop = None;
        if self.is_boosting {
            let drain = LENGTH_DRAIN_RATE_PER_TICK * dt;
            if self.true_length - drain > INITIAL_SEGMENT_COUNT as f64 {
                self.true_length -= drain;
                self.score -= drain * SCORE_PER_LENGTH_UNIT;
                self.drained_since_drop += drain;
                if self.drained_since_drop >= self.next_drop_threshold {
                    drop = self.segments.last().map(|tail| BoostDrop {
                        position: tail.position(),
                        value: rng.gen_range(0.5..1.5),
                    });
                    self.drained_since_drop -= self.next_drop_threshold;
                    self.next_drop_threshold = random_drop_threshold(rng);
                }
            } else {
                self.stop_boost();
            }
        }

        self.visual_length += (self.true_length - self.visual_length) * GROWTH_ANIMATION_SPEED;
        resize_chain(&mut self.segments, segment_count_for(self.visual_length));
        self.radius = radius_for_length(self.true_length);

        if let Err(fault) = self.check_finite() {
            checkpoint.restore(self);
            return Err(fault);
        }
        Ok(drop)
    }

    pub fn grow(&mut self, value: f64) {
        self.true_length += value * SEGMENT_GROWTH_MULTIPLIER;
        self.score += value * SCORE_PER_LENGTH_UNIT;
    }

    fn stop_boost(&mut self) {
        self.is_boosting = false;
        self.speed = BASE_SPEED;
    }

    fn steer_head(&mut self, dt: f64) {
        let head = self.head_position();
        let delta = self.target - head;
        let max_turn = TURN_SPEED * dt;
        if delta.length_squared() > 0.0 {
            let turn = clamp(angle_difference(self.angle, delta.angle()), -max_turn, max_turn);
            self.angle = normalize_angle(self.angle + turn);
        }

        let step = Vec2::from_angle(self.angle, self.speed * dt);
        let head = &mut self.segments[0];
        head.x += step.x;
        head.y += step.y;
        head.angle = self.angle;
    }

    fn check_finite(&self) -> Result<(), PhysicsFault> {
        if !self.angle.is_finite() {
            return Err(PhysicsFault::NonFinite { field: "angle" });
        }
        if !self.true_length.is_finite() || !self.visual_length.is_finite() {
            return Err(PhysicsFault::NonFinite { field: "length" });
        }
        if self
            .segments
            .iter()
            .any(|segment| !segment.x.is_finite() || !segment.y.is_finite())
        {
            return Err(PhysicsFault::NonFinite { field: "segment" });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_snake(length: f64) -> Snake {
        Snake::spawn(
            SnakeInit {
                id: "a".to_string(),
                username: "a".to_string(),
                color: 0,
                position: Vec2::ZERO,
                angle: 0.0,
                length,
                cash: 10.0,
                is_spectator: false,
            },
            &mut rand::thread_rng(),
        )
    }

    fn input(angle: f64, boost: bool, sequence: u32) -> InputFrame {
        InputFrame {
            target_angle: angle,
            is_boosting: boost,
            sequence,
        }
    }

    #[test]
    fn segment_count_tracks_visual_length_every_tick() {
        let mut snake = make_snake(10.0);
        snake.grow(40.0);
        let mut rng = rand::thread_rng();
        let mut last_gap = (snake.length() - snake.visual_length()).abs();
        for _ in 0..60 {
            snake.update(1.0, &mut rng).unwrap();
            assert_eq!(snake.segments.len(), segment_count_for(snake.visual_length()));
            let gap = (snake.length() - snake.visual_length()).abs();
            assert!(gap <= last_gap);
            last_gap = gap;
        }
    }

    #[test]
    fn head_turn_is_clamped_per_frame() {
        let mut snake = make_snake(10.0);
        snake.apply_input(&input(std::f64::consts::PI / 2.0, false, 1));
        snake.update(1.0, &mut rand::thread_rng()).unwrap();
        assert!((snake.angle() - TURN_SPEED).abs() < 1e-9);
        let head = snake.head_position();
        assert!((head.length() - BASE_SPEED).abs() < 1e-9);
    }

    #[test]
    fn drain_inputs_records_last_sequence() {
        let mut snake = make_snake(10.0);
        snake.pending_inputs.push_back(input(0.3, false, 4));
        snake.pending_inputs.push_back(input(0.6, true, 5));
        snake.drain_inputs();
        assert_eq!(snake.last_processed_input, 5);
        assert!(snake.is_boosting);
        assert!(snake.pending_inputs.is_empty());
    }

    #[test]
    fn boost_drains_length_and_score_and_drops_pellets() {
        let mut snake = make_snake(50.0);
        let start_score = snake.score;
        snake.apply_input(&input(0.0, true, 1));
        let mut rng = rand::thread_rng();
        let mut drops = 0;
        for _ in 0..200 {
            if let Some(drop) = snake.update(1.0, &mut rng).unwrap() {
                assert!((0.5..1.5).contains(&drop.value));
                drops += 1;
            }
        }
        assert!((snake.length() - 48.0).abs() < 1e-6);
        assert!((start_score - snake.score - 4.0).abs() < 1e-6);
        assert!(drops >= 1);
    }

    #[test]
    fn boost_cancels_at_length_floor() {
        let mut snake = make_snake(5.0);
        snake.apply_input(&input(0.0, true, 1));
        assert!(snake.is_boosting);
        snake.update(1.0, &mut rand::thread_rng()).unwrap();
        assert!(!snake.is_boosting);
        assert_eq!(snake.length(), 5.0);
        assert_eq!(snake.speed(), BASE_SPEED);
    }

    #[test]
    fn radius_grows_with_length_and_caps() {
        assert!(radius_for_length(20.0) > radius_for_length(10.0));
        assert_eq!(radius_for_length(10_000.0), radius_for_length(310.0));
        assert_eq!(radius_for_length(10.0), BASE_SEGMENT_RADIUS);
    }

    #[test]
    fn invalid_delta_is_a_fault_and_leaves_state() {
        let mut snake = make_snake(10.0);
        let before = snake.segments.clone();
        let result = snake.update(f64::NAN, &mut rand::thread_rng());
        assert!(matches!(result, Err(PhysicsFault::InvalidDelta(_))));
        assert_eq!(snake.segments, before);
    }

    #[test]
    fn overflowing_step_rolls_back_every_field() {
        let mut snake = make_snake(50.0);
        snake.apply_input(&input(0.5, true, 1));
        let before = snake.clone();

        let result = snake.update(f64::MAX, &mut rand::thread_rng());

        assert!(matches!(result, Err(PhysicsFault::NonFinite { .. })));
        assert_eq!(snake.segments, before.segments);
        assert_eq!(snake.angle(), before.angle());
        assert!(snake.is_boosting);
        assert_eq!(snake.speed(), before.speed());
        assert_eq!(snake.length(), before.length());
        assert_eq!(snake.visual_length(), before.visual_length());
        assert_eq!(snake.score, before.score);
        assert_eq!(snake.radius, before.radius);
        assert_eq!(snake.segments.len(), segment_count_for(snake.visual_length()));
    }

    #[test]
    fn chain_follow_never_moves_head() {
        let mut segments = vec![
            Segment::new(Vec2::new(10.0, 0.0), 0.0),
            Segment::new(Vec2::ZERO, 0.0),
            Segment::new(Vec2::new(-10.0, 0.0), 0.0),
        ];
        follow_chain(&mut segments, BASE_SPEED, 1.0);
        assert_eq!(segments[0].x, 10.0);
        assert!((segments[1].x - 2.0).abs() < 1e-9);
    }
}
