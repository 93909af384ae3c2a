use super::constants::{
    SELF_COLLISION_NECK, SNAKE_QUERY_RADIUS_FACTOR, SPATIAL_CELL_SIZE, TIP_ANGLE_DEGREES,
    TIP_PROJECTION_FACTOR, WALL_COLLISION_ANGLE_DEGREES, WALL_KILL_THRESHOLD, WORLD_RADIUS,
};
use super::math::{angle_difference, Vec2};
use super::snake::Snake;
use super::spatial::SpatialGrid;
use super::types::EntityId;
use std::collections::HashMap;

/// Nose-cone narrow phase: the attacker only hits when one of three points
/// projected ahead of its head lands inside the target circle.
pub fn tip_hits(
    head: Vec2,
    heading: f64,
    head_radius: f64,
    target: Vec2,
    target_radius: f64,
) -> bool {
    let radius_sum = head_radius + target_radius;
    if head.distance_squared(target) > radius_sum * radius_sum {
        return false;
    }

    let projection = head_radius * TIP_PROJECTION_FACTOR;
    let tip_angle = TIP_ANGLE_DEGREES.to_radians();
    let target_radius_sq = target_radius * target_radius;
    [0.0, tip_angle, -tip_angle].iter().any(|offset| {
        let tip = head + Vec2::from_angle(heading + offset, projection);
        tip.distance_squared(target) < target_radius_sq
    })
}

pub fn circles_overlap(a: Vec2, a_radius: f64, b: Vec2, b_radius: f64) -> bool {
    let sum = a_radius + b_radius;
    a.distance_squared(b) < sum * sum
}

/// Boundary rule: past the kill threshold is always fatal; inside the inner
/// margin only a heading pointed into the wall kills.
pub fn hits_wall(head: Vec2, heading: f64, radius: f64) -> bool {
    let distance = head.length();
    if distance > WORLD_RADIUS + WALL_KILL_THRESHOLD {
        return true;
    }
    if distance > WORLD_RADIUS - radius {
        let outward = head.angle();
        let cone = (WALL_COLLISION_ANGLE_DEGREES / 2.0).to_radians();
        return angle_difference(heading, outward).abs() < cone;
    }
    false
}

/// Head-on outcome as `(victim, killer)`. Symmetric in its arguments: the
/// strictly shorter entity dies, equal lengths fall to the smaller id.
pub fn resolve_head_on<'a>(
    a: (&'a str, f64),
    b: (&'a str, f64),
) -> (&'a str, &'a str) {
    let (a_id, a_len) = a;
    let (b_id, b_len) = b;
    if a_len < b_len {
        (a_id, b_id)
    } else if b_len < a_len {
        (b_id, a_id)
    } else if a_id < b_id {
        (a_id, b_id)
    } else {
        (b_id, a_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnakeHit {
    pub victim: EntityId,
    pub killer: EntityId,
    pub head_on: bool,
}

#[derive(Debug, Clone)]
struct IndexedBody {
    id: EntityId,
    head: Vec2,
    radius: f64,
    length: f64,
}

/// Broad phase over every live, non-spectator segment plus the snake narrow phase.
#[derive(Debug)]
pub struct CollisionDetector {
    grid: SpatialGrid<(usize, usize)>,
    bodies: Vec<IndexedBody>,
    slots: HashMap<EntityId, usize>,
}

impl Default for CollisionDetector {
    fn default() -> Self {
        Self::new(SPATIAL_CELL_SIZE)
    }
}

impl CollisionDetector {
    pub fn new(cell_size: f64) -> Self {
        Self {
            grid: SpatialGrid::new(cell_size),
            bodies: Vec::new(),
            slots: HashMap::new(),
        }
    }

    pub fn rebuild<'a>(&mut self, snakes: impl IntoIterator<Item = &'a Snake>) {
        self.grid.clear();
        self.bodies.clear();
        self.slots.clear();
        for snake in snakes {
            if snake.is_spectator {
                continue;
            }
            let slot = self.bodies.len();
            self.bodies.push(IndexedBody {
                id: snake.id.clone(),
                head: snake.head_position(),
                radius: snake.radius,
                length: snake.length(),
            });
            self.slots.insert(snake.id.clone(), slot);
            for (index, segment) in snake.segments.iter().enumerate() {
                self.grid.insert(segment.position(), (slot, index));
            }
        }
    }

    pub fn indexed_segments(&self) -> usize {
        self.grid.len()
    }

    pub fn is_indexed(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// Runs the tip test from `snake`'s head against every nearby indexed
    /// segment owned by an entity `is_live` accepts. Own-body hits never kill.
    /// A head-on hit reports whichever side loses the deterministic
    /// resolution, which may be the other entity.
    pub fn check_snake(&self, snake: &Snake, is_live: impl Fn(&str) -> bool) -> Option<SnakeHit> {
        if snake.is_spectator || !self.is_indexed(&snake.id) {
            return None;
        }
        let head = snake.head_position();
        let heading = snake.angle();
        let nearby = self
            .grid
            .query(head, snake.radius * SNAKE_QUERY_RADIUS_FACTOR);

        for (position, (slot, index)) in nearby {
            let Some(other) = self.bodies.get(slot) else { continue };
            let own = other.id == snake.id;
            if !own && !is_live(&other.id) {
                continue;
            }
            if own && index < SELF_COLLISION_NECK {
                continue;
            }
            if !tip_hits(head, heading, snake.radius, position, other.radius) {
                continue;
            }
            if position == other.head {
                if own {
                    continue;
                }
                let (victim, killer) =
                    resolve_head_on((&snake.id, snake.length()), (&other.id, other.length));
                return Some(SnakeHit {
                    victim: victim.to_string(),
                    killer: killer.to_string(),
                    head_on: true,
                });
            }
            if !own {
                return Some(SnakeHit {
                    victim: snake.id.clone(),
                    killer: other.id.clone(),
                    head_on: false,
                });
            }
        }
        None
    }

    pub fn check_wall(snake: &Snake) -> bool {
        !snake.is_spectator && hits_wall(snake.head_position(), snake.angle(), snake.radius)
    }
}
