use super::math::Vec2;

const MAX_DEPTH: u8 = 10;

/// Axis-aligned box described by its center and half extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub center: Vec2,
    pub half_width: f64,
    pub half_height: f64,
}

impl Bounds {
    pub fn square(center: Vec2, half_extent: f64) -> Self {
        Self {
            center,
            half_width: half_extent,
            half_height: half_extent,
        }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.center.x - self.half_width
            && point.x <= self.center.x + self.half_width
            && point.y >= self.center.y - self.half_height
            && point.y <= self.center.y + self.half_height
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        !(other.center.x - other.half_width > self.center.x + self.half_width
            || other.center.x + other.half_width < self.center.x - self.half_width
            || other.center.y - other.half_height > self.center.y + self.half_height
            || other.center.y + other.half_height < self.center.y - self.half_height)
    }
}

/// Region quadtree keyed by an id per point.
#[derive(Debug, Clone)]
pub struct Quadtree<K> {
    bounds: Bounds,
    capacity: usize,
    depth: u8,
    points: Vec<(Vec2, K)>,
    children: Option<Box<[Quadtree<K>; 4]>>,
}

impl<K: Copy + PartialEq> Quadtree<K> {
    pub fn new(bounds: Bounds, capacity: usize) -> Self {
        Self::with_depth(bounds, capacity.max(1), 0)
    }

    fn with_depth(bounds: Bounds, capacity: usize, depth: u8) -> Self {
        Self {
            bounds,
            capacity,
            depth,
            points: Vec::new(),
            children: None,
        }
    }

    fn subdivide(&mut self) {
        let Bounds {
            center,
            half_width,
            half_height,
        } = self.bounds;
        let hw = half_width / 2.0;
        let hh = half_height / 2.0;
        let capacity = self.capacity;
        let depth = self.depth + 1;
        let child = |dx: f64, dy: f64| {
            Quadtree::with_depth(
                Bounds {
                    center: Vec2::new(center.x + dx, center.y + dy),
                    half_width: hw,
                    half_height: hh,
                },
                capacity,
                depth,
            )
        };
        self.children = Some(Box::new([
            child(hw, -hh),
            child(-hw, -hh),
            child(hw, hh),
            child(-hw, hh),
        ]));
    }

    pub fn insert(&mut self, position: Vec2, key: K) -> bool {
        if !self.bounds.contains(position) {
            return false;
        }
        if self.points.len() < self.capacity || self.depth >= MAX_DEPTH {
            self.points.push((position, key));
            return true;
        }
        if self.children.is_none() {
            self.subdivide();
        }
        match self.children.as_mut() {
            Some(children) => children.iter_mut().any(|child| child.insert(position, key)),
            None => false,
        }
    }

    pub fn remove(&mut self, position: Vec2, key: K) -> bool {
        if !self.bounds.contains(position) {
            return false;
        }
        if let Some(index) = self.points.iter().position(|(_, existing)| *existing == key) {
            self.points.swap_remove(index);
            return true;
        }
        match self.children.as_mut() {
            Some(children) => children.iter_mut().any(|child| child.remove(position, key)),
            None => false,
        }
    }

    pub fn query(&self, range: &Bounds) -> Vec<K> {
        let mut found = Vec::new();
        self.query_into(range, &mut found);
        found
    }

    fn query_into(&self, range: &Bounds, found: &mut Vec<K>) {
        if !self.bounds.intersects(range) {
            return;
        }
        found.extend(
            self.points
                .iter()
                .filter(|(position, _)| range.contains(*position))
                .map(|(_, key)| *key),
        );
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                child.query_into(range, found);
            }
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.children = None;
    }
}
