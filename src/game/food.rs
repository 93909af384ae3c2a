use super::constants::{
    DEATH_FOOD_JITTER_FACTOR, DEATH_FOOD_OFFSET_FACTOR, DEATH_FOOD_STRIDE,
    DEATH_FOOD_VALUE_FACTOR, FOOD_BASE_RADIUS, FOOD_QUADTREE_CAPACITY, FOOD_RESPAWN_ATTEMPTS,
    FOOD_RESPAWN_EXCLUSION, MAX_FOOD_ITEMS, MAX_FOOD_RADIUS, SCORE_PER_LENGTH_UNIT, WORLD_RADIUS,
};
use super::math::{random_point_in_circle, Vec2};
use super::quadtree::{Bounds, Quadtree};
use super::snake::Snake;
use super::types::{Food, FoodId};
use rand::Rng;
use std::collections::HashMap;

/// Result of eating one item: the removed food and its replacement, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Consumed {
    pub eaten: Food,
    pub respawned: Option<Food>,
}

pub fn radius_for_value(value: f64) -> f64 {
    (FOOD_BASE_RADIUS + value / 2.0 * 5.0).min(MAX_FOOD_RADIUS)
}

/// Draws a normal food value from the weighted bands.
pub fn random_food_value(rng: &mut impl Rng) -> f64 {
    let roll: f64 = rng.gen();
    if roll < 0.4 {
        0.2 + rng.gen::<f64>() * 0.25
    } else if roll < 0.5 {
        0.45 + rng.gen::<f64>() * 0.25
    } else if roll < 0.64 {
        0.75 + rng.gen::<f64>() * 0.7
    } else if roll < 0.78 {
        1.2 + rng.gen::<f64>() * 0.8
    } else {
        2.0 + rng.gen::<f64>() * 1.0
    }
}

pub fn random_food_position(rng: &mut impl Rng) -> Vec2 {
    random_point_in_circle(rng, WORLD_RADIUS - MAX_FOOD_RADIUS)
}

#[derive(Debug)]
pub struct FoodField {
    foods: HashMap<FoodId, Food>,
    tree: Quadtree<FoodId>,
    next_id: FoodId,
}

impl Default for FoodField {
    fn default() -> Self {
        Self::new()
    }
}

impl FoodField {
    pub fn new() -> Self {
        Self {
            foods: HashMap::new(),
            tree: Quadtree::new(
                Bounds::square(Vec2::ZERO, WORLD_RADIUS * 2.0),
                FOOD_QUADTREE_CAPACITY,
            ),
            next_id: 0,
        }
    }

    pub fn with_initial_population(rng: &mut impl Rng) -> Self {
        let mut field = Self::new();
        let count = (WORLD_RADIUS / 3.0).ceil() as usize;
        for _ in 0..count {
            field.spawn_random(rng);
        }
        field
    }

    pub fn len(&self) -> usize {
        self.foods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.foods.is_empty()
    }

    pub fn get(&self, id: FoodId) -> Option<&Food> {
        self.foods.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Food> {
        self.foods.values()
    }

    fn insert(&mut self, position: Vec2, value: f64, radius: f64, death_color: Option<u32>) -> Option<Food> {
        if self.foods.len() >= MAX_FOOD_ITEMS || !position.is_finite() || !value.is_finite() {
            return None;
        }
        let food = Food {
            id: self.next_id,
            x: position.x,
            y: position.y,
            radius,
            value,
            is_death_food: death_color.is_some(),
            color: death_color,
        };
        if !self.tree.insert(position, food.id) {
            return None;
        }
        self.next_id = self.next_id.wrapping_add(1);
        self.foods.insert(food.id, food.clone());
        Some(food)
    }

    pub fn spawn_random(&mut self, rng: &mut impl Rng) -> Option<Food> {
        let value = random_food_value(rng);
        let position = random_food_position(rng);
        self.insert(position, value, radius_for_value(value), None)
    }

    pub fn spawn_at(&mut self, position: Vec2, value: f64) -> Option<Food> {
        self.insert(position, value, radius_for_value(value), None)
    }

    /// Scatters death food over every `DEATH_FOOD_STRIDE`th segment of a body.
    pub fn spawn_death_burst(&mut self, snake: &Snake, rng: &mut impl Rng) -> Vec<Food> {
        let segment_count = snake.segments.len().max(1) as f64;
        let per_item = (snake.score / SCORE_PER_LENGTH_UNIT) / segment_count * 4.0;
        let value = (per_item * DEATH_FOOD_VALUE_FACTOR).max(0.0);
        let offset = snake.radius * DEATH_FOOD_OFFSET_FACTOR;
        let jitter = snake.radius * DEATH_FOOD_JITTER_FACTOR;

        let mut burst = Vec::new();
        for segment in snake.segments.iter().step_by(DEATH_FOOD_STRIDE) {
            let anchor = segment.position() + Vec2::from_angle(segment.angle, offset);
            let position = Vec2::new(
                anchor.x + (rng.gen::<f64>() - 0.5) * jitter,
                anchor.y + (rng.gen::<f64>() - 0.5) * jitter,
            );
            if let Some(food) = self.insert(position, value, MAX_FOOD_RADIUS * 2.0, Some(snake.color)) {
                burst.push(food);
            }
        }
        burst
    }

    /// Stores an item under its existing id, replacing any previous copy.
    /// Used by mirrors of a field owned elsewhere.
    pub fn upsert(&mut self, food: Food) -> bool {
        self.remove(food.id);
        if self.foods.len() >= MAX_FOOD_ITEMS || !food.position().is_finite() {
            return false;
        }
        if !self.tree.insert(food.position(), food.id) {
            return false;
        }
        self.foods.insert(food.id, food);
        true
    }

    pub fn remove(&mut self, id: FoodId) -> Option<Food> {
        let food = self.foods.remove(&id)?;
        self.tree.remove(food.position(), id);
        Some(food)
    }

    /// Removes an eaten item. Normal food respawns away from `consumer`;
    /// death food is gone for good.
    pub fn consume(
        &mut self,
        id: FoodId,
        consumer: Option<Vec2>,
        rng: &mut impl Rng,
    ) -> Option<Consumed> {
        let eaten = self.remove(id)?;
        if eaten.is_death_food {
            return Some(Consumed {
                eaten,
                respawned: None,
            });
        }
        let position = match consumer {
            Some(head) => respawn_position_away_from(head, rng),
            None => random_food_position(rng),
        };
        let value = random_food_value(rng);
        let respawned = self.insert(position, value, radius_for_value(value), None);
        Some(Consumed { eaten, respawned })
    }

    /// Foods inside the axis-aligned square of half extent `half_extent`.
    pub fn query_square(&self, center: Vec2, half_extent: f64) -> Vec<&Food> {
        self.tree
            .query(&Bounds::square(center, half_extent))
            .into_iter()
            .filter_map(|id| self.foods.get(&id))
            .collect()
    }
}

fn respawn_position_away_from(head: Vec2, rng: &mut impl Rng) -> Vec2 {
    for _ in 0..FOOD_RESPAWN_ATTEMPTS {
        let candidate = random_food_position(rng);
        if candidate.distance(head) > FOOD_RESPAWN_EXCLUSION {
            return candidate;
        }
    }
    random_food_position(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::snake::SnakeInit;

    fn dead_snake(length: f64) -> Snake {
        Snake::spawn(
            SnakeInit {
                id: "victim".to_string(),
                username: "victim".to_string(),
                color: 0xabcdef,
                position: Vec2::new(100.0, 100.0),
                angle: 0.0,
                length,
                cash: 5.0,
                is_spectator: false,
            },
            &mut rand::thread_rng(),
        )
    }

    #[test]
    fn initial_population_fills_world() {
        let field = FoodField::with_initial_population(&mut rand::thread_rng());
        assert_eq!(field.len(), (WORLD_RADIUS / 3.0).ceil() as usize);
        for food in field.iter() {
            assert!(food.position().length() <= WORLD_RADIUS - MAX_FOOD_RADIUS + 1e-9);
            assert!(food.radius <= MAX_FOOD_RADIUS);
            assert!(!food.is_death_food);
        }
    }

    #[test]
    fn normal_food_respawns_exactly_once() {
        let mut rng = rand::thread_rng();
        let mut field = FoodField::new();
        let food = field.spawn_at(Vec2::new(10.0, 0.0), 1.0).unwrap();
        let consumed = field.consume(food.id, Some(Vec2::ZERO), &mut rng).unwrap();
        assert_eq!(consumed.eaten.id, food.id);
        assert!(consumed.respawned.is_some());
        assert_eq!(field.len(), 1);
        assert!(field.consume(food.id, Some(Vec2::ZERO), &mut rng).is_none());
        assert_eq!(field.len(), 1);
    }

    #[test]
    fn death_food_never_respawns() {
        let mut rng = rand::thread_rng();
        let mut field = FoodField::new();
        let burst = field.spawn_death_burst(&dead_snake(20.0), &mut rng);
        assert_eq!(burst.len(), 5);
        assert!(burst.iter().all(|food| food.is_death_food && food.color == Some(0xabcdef)));
        let consumed = field.consume(burst[0].id, None, &mut rng).unwrap();
        assert!(consumed.respawned.is_none());
        assert_eq!(field.len(), 4);
    }

    #[test]
    fn death_burst_value_follows_score_share() {
        let snake = dead_snake(20.0);
        let mut field = FoodField::new();
        let burst = field.spawn_death_burst(&snake, &mut rand::thread_rng());
        let expected = (snake.score / SCORE_PER_LENGTH_UNIT) / 20.0 * 4.0 * DEATH_FOOD_VALUE_FACTOR;
        assert!((burst[0].value - expected).abs() < 1e-9);
        assert_eq!(burst[0].radius, MAX_FOOD_RADIUS * 2.0);
    }

    #[test]
    fn query_square_uses_tree() {
        let mut field = FoodField::new();
        field.spawn_at(Vec2::new(5.0, 5.0), 0.5);
        field.spawn_at(Vec2::new(300.0, 5.0), 0.5);
        assert_eq!(field.query_square(Vec2::ZERO, 50.0).len(), 1);
    }

    #[test]
    fn upsert_replaces_by_id() {
        let mut field = FoodField::new();
        let mut food = field.spawn_at(Vec2::new(5.0, 5.0), 0.5).unwrap();
        food.x = 400.0;
        assert!(field.upsert(food.clone()));
        assert_eq!(field.len(), 1);
        assert!(field.query_square(Vec2::ZERO, 50.0).is_empty());
        assert_eq!(field.query_square(Vec2::new(400.0, 5.0), 10.0)[0].id, food.id);
    }

    #[test]
    fn value_bands_stay_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let value = random_food_value(&mut rng);
            assert!((0.2..=3.0).contains(&value));
        }
    }
}
