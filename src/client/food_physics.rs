use crate::game::constants::client::{
    ATTRACTION_CONE_ANGLE, ATTRACTION_RADIUS_BASE, ATTRACTION_RADIUS_GROWTH_FACTOR,
    ATTRACTION_SPEED, FINAL_SCALE_PERCENT,
};
use crate::game::food::FoodField;
use crate::game::math::{angle_difference, Vec2};
use crate::game::types::{EntityId, Food, FoodId};
use std::collections::HashMap;

/// Head state an item can be pulled toward.
#[derive(Debug, Clone, PartialEq)]
pub struct Attractor {
    pub id: EntityId,
    pub head: Vec2,
    pub radius: f64,
    pub angle: f64,
    pub is_boosting: bool,
    pub is_spectator: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HomingFood {
    pub food: Food,
    pub target: EntityId,
    pub start_distance: f64,
    pub scale: f64,
}

pub fn attraction_radius(head_radius: f64) -> f64 {
    ATTRACTION_RADIUS_BASE + head_radius * ATTRACTION_RADIUS_GROWTH_FACTOR
}

/// Presentation-only pull of nearby items toward heads. An item that starts
/// homing leaves the field until it is consumed or released.
#[derive(Debug, Default)]
pub struct FoodPhysics {
    homing: HashMap<FoodId, HomingFood>,
}

impl FoodPhysics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn homing(&self, id: FoodId) -> Option<&HomingFood> {
        self.homing.get(&id)
    }

    pub fn homing_count(&self) -> usize {
        self.homing.len()
    }

    /// Stops tracking an item, e.g. once the server reports it eaten.
    pub fn cancel(&mut self, id: FoodId) -> Option<HomingFood> {
        self.homing.remove(&id)
    }

    /// Advances homing items and picks up new ones. Returns the items that
    /// reached their target this step.
    pub fn update(&mut self, attractors: &[Attractor], field: &mut FoodField, dt: f64) -> Vec<Food> {
        let consumed = self.advance(attractors, field, dt);
        self.capture(attractors, field);
        consumed
    }

    fn advance(&mut self, attractors: &[Attractor], field: &mut FoodField, dt: f64) -> Vec<Food> {
        let mut consumed = Vec::new();
        let mut released = Vec::new();

        for (id, homing) in self.homing.iter_mut() {
            let Some(target) = attractors.iter().find(|attractor| attractor.id == homing.target) else {
                released.push(*id);
                continue;
            };

            let delta = target.head - homing.food.position();
            let distance = delta.length();
            if distance < target.radius {
                consumed.push(*id);
                continue;
            }

            let speed = if target.is_boosting {
                ATTRACTION_SPEED * 2.0
            } else {
                ATTRACTION_SPEED
            };
            let step = delta * (speed * (dt / 60.0) / distance);
            homing.food.x += step.x;
            homing.food.y += step.y;

            let progress = if homing.start_distance > 0.0 {
                (1.0 - distance / homing.start_distance).max(0.0)
            } else {
                1.0
            };
            homing.scale = 1.0 - (1.0 - FINAL_SCALE_PERCENT) * progress;
        }

        for id in released {
            if let Some(homing) = self.homing.remove(&id) {
                field.upsert(homing.food);
            }
        }
        consumed
            .into_iter()
            .filter_map(|id| self.homing.remove(&id))
            .map(|homing| homing.food)
            .collect()
    }

    fn capture(&mut self, attractors: &[Attractor], field: &mut FoodField) {
        for attractor in attractors {
            if attractor.is_spectator {
                continue;
            }
            let reach = attraction_radius(attractor.radius);
            let candidates: Vec<(FoodId, f64)> = field
                .query_square(attractor.head, reach)
                .into_iter()
                .filter_map(|food| {
                    let offset = food.position() - attractor.head;
                    let distance = offset.length();
                    if distance > reach {
                        return None;
                    }
                    let touching = distance <= attractor.radius + food.radius;
                    let in_cone = angle_difference(attractor.angle, offset.angle()).abs()
                        < ATTRACTION_CONE_ANGLE / 2.0;
                    (touching || in_cone).then_some((food.id, distance))
                })
                .collect();

            for (id, distance) in candidates {
                let Some(food) = field.remove(id) else { continue };
                self.homing.insert(
                    id,
                    HomingFood {
                        food,
                        target: attractor.id.clone(),
                        start_distance: distance,
                        scale: 1.0,
                    },
                );
            }
        }
    }
}
