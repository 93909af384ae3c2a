use crate::game::math::Vec2;
use crate::game::types::EntityId;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("collision pool exhausted at {max} objects with nothing to recycle")]
    Exhausted { max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartKind {
    Head,
    #[default]
    Body,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollisionObject {
    pub position: Vec2,
    pub radius: f64,
    pub angle: f64,
    pub kind: PartKind,
    pub owner: EntityId,
    pub segment_index: usize,
}

pub type ObjectHandle = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub retained: usize,
    pub active: usize,
    pub available: usize,
}

/// Slot arena for per-rebuild collision objects. Handles stay valid until
/// the next `release_all`; at the hard cap the oldest active slot is reused.
#[derive(Debug)]
pub struct CollisionObjectPool {
    slots: Vec<CollisionObject>,
    in_use: Vec<bool>,
    free: Vec<ObjectHandle>,
    active: VecDeque<ObjectHandle>,
    retained: usize,
    max: usize,
}

impl CollisionObjectPool {
    pub fn new(initial: usize, max: usize) -> Self {
        let retained = initial.min(max);
        Self {
            slots: vec![CollisionObject::default(); retained],
            in_use: vec![false; retained],
            free: (0..retained).rev().collect(),
            active: VecDeque::with_capacity(retained),
            retained,
            max,
        }
    }

    pub fn acquire(&mut self, object: CollisionObject) -> Result<ObjectHandle, PoolError> {
        let handle = if let Some(handle) = self.free.pop() {
            handle
        } else if self.active.len() < self.max {
            self.slots.push(CollisionObject::default());
            self.in_use.push(false);
            self.slots.len() - 1
        } else if let Some(oldest) = self.active.pop_front() {
            oldest
        } else {
            return Err(PoolError::Exhausted { max: self.max });
        };

        self.slots[handle] = object;
        self.in_use[handle] = true;
        self.active.push_back(handle);
        Ok(handle)
    }

    /// The active slot the next `acquire` will overwrite, if any.
    pub fn next_recycled(&self) -> Option<ObjectHandle> {
        if !self.free.is_empty() || self.active.len() < self.max {
            return None;
        }
        self.active.front().copied()
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&CollisionObject> {
        match self.in_use.get(handle) {
            Some(true) => self.slots.get(handle),
            _ => None,
        }
    }

    pub fn release(&mut self, handle: ObjectHandle) {
        let Some(index) = self.active.iter().position(|active| *active == handle) else {
            return;
        };
        self.active.remove(index);
        self.slots[handle] = CollisionObject::default();
        self.in_use[handle] = false;
        self.free.push(handle);
    }

    /// Returns every object to the pool and shrinks back to the retained size.
    pub fn release_all(&mut self) {
        self.active.clear();
        self.slots.truncate(self.retained);
        self.in_use.truncate(self.retained);
        for slot in &mut self.slots {
            *slot = CollisionObject::default();
        }
        self.in_use.fill(false);
        self.free = (0..self.slots.len()).rev().collect();
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            retained: self.retained,
            active: self.active.len(),
            available: self.free.len(),
        }
    }
}
