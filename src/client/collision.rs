use super::mirror::RemoteSnake;
use super::pool::{CollisionObject, CollisionObjectPool, ObjectHandle, PartKind, PoolError};
use crate::game::collision::{resolve_head_on, tip_hits};
use crate::game::constants::client::{
    GRID_REBUILD_INTERVAL_MS, HEAD_CHECK_INTERVAL_MS, MIN_GRID_CELL_SIZE, POOL_INITIAL_SIZE,
    POOL_MAX_SIZE,
};
use crate::game::constants::{SNAKE_QUERY_RADIUS_FACTOR, WORLD_RADIUS};
use crate::game::math::Vec2;
use crate::game::snake::Snake;
use crate::game::spatial::SpatialGrid;
use crate::game::types::{EntityId, Segment};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHit {
    pub victim: EntityId,
    pub killer: EntityId,
    pub head_on: bool,
}

/// Client wall rule: stricter than the server backstop, any contact with
/// the inner margin is fatal.
pub fn hits_local_wall(head: Vec2, radius: f64) -> bool {
    head.length() > WORLD_RADIUS - radius
}

/// Body sampling stride for the local broad phase.
pub fn sampling_stride(segment_count: usize) -> usize {
    match segment_count {
        0..=20 => 1,
        21..=50 => 2,
        _ => 3,
    }
}

/// Local mirror of the server broad and narrow phase, run only against the
/// player's own head.
#[derive(Debug)]
pub struct LocalCollisionManager {
    grid: SpatialGrid<ObjectHandle>,
    pool: CollisionObjectPool,
    last_rebuild_ms: Option<i64>,
    last_head_check_ms: Option<i64>,
}

impl Default for LocalCollisionManager {
    fn default() -> Self {
        Self::new(CollisionObjectPool::new(POOL_INITIAL_SIZE, POOL_MAX_SIZE))
    }
}

impl LocalCollisionManager {
    pub fn new(pool: CollisionObjectPool) -> Self {
        Self {
            grid: SpatialGrid::new(MIN_GRID_CELL_SIZE.max(WORLD_RADIUS / 50.0)),
            pool,
            last_rebuild_ms: None,
            last_head_check_ms: None,
        }
    }

    pub fn indexed_objects(&self) -> usize {
        self.grid.len()
    }

    /// Rebuilds the grid and checks the player's head when their cadences
    /// are due. A rebuild that runs out of pool slots is abandoned and the
    /// head check waits for the next one.
    pub fn update(
        &mut self,
        now_ms: i64,
        player: &Snake,
        player_collided: bool,
        others: &HashMap<EntityId, RemoteSnake>,
    ) -> Vec<LocalHit> {
        let rebuild_due = self
            .last_rebuild_ms
            .map_or(true, |last| now_ms - last > GRID_REBUILD_INTERVAL_MS);
        if rebuild_due {
            self.last_rebuild_ms = Some(now_ms);
            if let Err(error) = self.rebuild(player, player_collided, others) {
                tracing::warn!(%error, "local collision rebuild skipped");
                self.grid.clear();
                self.pool.release_all();
                return Vec::new();
            }
        }

        let check_due = self
            .last_head_check_ms
            .map_or(true, |last| now_ms - last > HEAD_CHECK_INTERVAL_MS);
        if !check_due || player_collided || player.is_spectator {
            return Vec::new();
        }
        self.last_head_check_ms = Some(now_ms);
        self.check_player(player, others).into_iter().collect()
    }

    fn rebuild(
        &mut self,
        player: &Snake,
        player_collided: bool,
        others: &HashMap<EntityId, RemoteSnake>,
    ) -> Result<(), PoolError> {
        self.grid.clear();
        self.pool.release_all();

        if !player_collided && !player.is_spectator {
            self.index_body(&player.id, &player.segments, player.radius, true)?;
        }
        for other in others.values() {
            if other.collided || other.is_spectator {
                continue;
            }
            self.index_body(&other.id, &other.segments, other.radius, false)?;
        }
        Ok(())
    }

    /// The player's own body only contributes its head; remote bodies are
    /// sampled with a length-dependent stride.
    fn index_body(
        &mut self,
        owner: &str,
        segments: &[Segment],
        radius: f64,
        head_only: bool,
    ) -> Result<(), PoolError> {
        let Some(head) = segments.first() else {
            return Ok(());
        };
        self.index_part(owner, *head, 0, radius, PartKind::Head)?;
        if head_only {
            return Ok(());
        }
        let stride = sampling_stride(segments.len());
        for index in (1..segments.len()).step_by(stride) {
            self.index_part(owner, segments[index], index, radius, PartKind::Body)?;
        }
        Ok(())
    }

    fn index_part(
        &mut self,
        owner: &str,
        segment: Segment,
        index: usize,
        radius: f64,
        kind: PartKind,
    ) -> Result<(), PoolError> {
        if let Some(recycled) = self.pool.next_recycled() {
            if let Some(stale) = self.pool.get(recycled) {
                self.grid.remove(stale.position, recycled);
            }
        }
        let handle = self.pool.acquire(CollisionObject {
            position: segment.position(),
            radius,
            angle: segment.angle,
            kind,
            owner: owner.to_string(),
            segment_index: index,
        })?;
        self.grid.insert(segment.position(), handle);
        Ok(())
    }

    fn check_player(
        &self,
        player: &Snake,
        others: &HashMap<EntityId, RemoteSnake>,
    ) -> Option<LocalHit> {
        let head = player.head_position();
        let heading = player.angle();
        let radius = player.radius;

        for (_, handle) in self.grid.query(head, radius * SNAKE_QUERY_RADIUS_FACTOR) {
            let Some(object) = self.pool.get(handle) else { continue };
            if object.owner == player.id {
                continue;
            }
            if !tip_hits(head, heading, radius, object.position, object.radius) {
                continue;
            }
            let Some(other) = others.get(&object.owner) else {
                continue;
            };
            return match object.kind {
                PartKind::Head => {
                    let (victim, killer) =
                        resolve_head_on((&player.id, player.length()), (&other.id, other.length));
                    Some(LocalHit {
                        victim: victim.to_string(),
                        killer: killer.to_string(),
                        head_on: true,
                    })
                }
                PartKind::Body => Some(LocalHit {
                    victim: player.id.clone(),
                    killer: other.id.clone(),
                    head_on: false,
                }),
            };
        }
        None
    }
}
