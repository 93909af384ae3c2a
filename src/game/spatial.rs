use super::math::Vec2;
use std::collections::HashMap;

/// Uniform-grid broad phase. Rebuilt from scratch whenever positions change.
#[derive(Debug, Clone)]
pub struct SpatialGrid<T> {
    cell_size: f64,
    cells: HashMap<(i32, i32), Vec<(Vec2, T)>>,
    len: usize,
}

impl<T: Copy> SpatialGrid<T> {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: if cell_size.is_finite() && cell_size > 0.0 {
                cell_size
            } else {
                1.0
            },
            cells: HashMap::new(),
            len: 0,
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        for bucket in self.cells.values_mut() {
            bucket.clear();
        }
        self.len = 0;
    }

    fn cell_of(&self, position: Vec2) -> (i32, i32) {
        (
            (position.x / self.cell_size).floor() as i32,
            (position.y / self.cell_size).floor() as i32,
        )
    }

    pub fn insert(&mut self, position: Vec2, item: T) {
        if !position.is_finite() {
            return;
        }
        let key = self.cell_of(position);
        self.cells.entry(key).or_default().push((position, item));
        self.len += 1;
    }

    /// Every entry whose position lies within `radius` of `center`.
    pub fn query(&self, center: Vec2, radius: f64) -> Vec<(Vec2, T)> {
        let mut found = Vec::new();
        if !center.is_finite() || !radius.is_finite() || radius < 0.0 {
            return found;
        }
        let (min_x, min_y) = self.cell_of(Vec2::new(center.x - radius, center.y - radius));
        let (max_x, max_y) = self.cell_of(Vec2::new(center.x + radius, center.y + radius));
        let radius_sq = radius * radius;
        for cx in min_x..=max_x {
            for cy in min_y..=max_y {
                let Some(bucket) = self.cells.get(&(cx, cy)) else { continue };
                found.extend(
                    bucket
                        .iter()
                        .filter(|(position, _)| position.distance_squared(center) <= radius_sq)
                        .copied(),
                );
            }
        }
        found
    }
}

impl<T: Copy + PartialEq> SpatialGrid<T> {
    /// Drops one entry for `item` stored at `position`.
    pub fn remove(&mut self, position: Vec2, item: T) -> bool {
        if !position.is_finite() {
            return false;
        }
        let key = self.cell_of(position);
        let Some(bucket) = self.cells.get_mut(&key) else {
            return false;
        };
        let Some(index) = bucket.iter().position(|(_, stored)| *stored == item) else {
            return false;
        };
        bucket.swap_remove(index);
        self.len -= 1;
        true
    }
}
