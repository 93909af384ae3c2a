use super::mirror::RemoteSnake;
use crate::game::constants::client::{
    COLLISION_TIMEOUT_MS, REPORT_COOLDOWN_MS, ROLLBACK_EXPIRY_MS,
};
use crate::game::math::Vec2;
use crate::game::types::{EntityId, Segment};
use std::collections::HashMap;

/// Lifecycle of a tracked remote entity on the predicting client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    Alive,
    OptimisticallyDead { since_ms: i64 },
    ConfirmedDead,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollbackSnapshot {
    pub position: Vec2,
    pub segments: Vec<Segment>,
    pub collided: bool,
    pub taken_at_ms: i64,
}

impl RollbackSnapshot {
    pub fn capture(snake: &RemoteSnake, now_ms: i64) -> Self {
        Self {
            position: snake.head_position(),
            segments: snake.segments.clone(),
            collided: snake.collided,
            taken_at_ms: now_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingReport {
    victim: EntityId,
    killer: EntityId,
    reported_at_ms: i64,
}

/// Bookkeeping for optimistic deaths: outstanding reports, restore points,
/// and the per-victim cooldown. Swept once per local tick.
#[derive(Debug, Default)]
pub struct RollbackTracker {
    states: HashMap<EntityId, LifeState>,
    snapshots: HashMap<EntityId, RollbackSnapshot>,
    reports: Vec<PendingReport>,
}

impl RollbackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: &str) -> LifeState {
        self.states.get(id).copied().unwrap_or(LifeState::Alive)
    }

    pub fn snapshot(&self, id: &str) -> Option<&RollbackSnapshot> {
        self.snapshots.get(id)
    }

    pub fn pending_reports(&self) -> usize {
        self.reports.len()
    }

    /// True while a report for `victim` was sent less than the cooldown ago.
    pub fn has_recent_report(&self, victim: &str, now_ms: i64) -> bool {
        self.reports
            .iter()
            .any(|report| report.victim == victim && now_ms - report.reported_at_ms < REPORT_COOLDOWN_MS)
    }

    pub fn record_report(&mut self, victim: &str, killer: &str, now_ms: i64) {
        self.reports.push(PendingReport {
            victim: victim.to_string(),
            killer: killer.to_string(),
            reported_at_ms: now_ms,
        });
    }

    /// Freezes `snake` as optimistically dead and keeps a restore point.
    /// Returns false when the entity was already frozen.
    pub fn mark_optimistic(&mut self, snake: &mut RemoteSnake, now_ms: i64) -> bool {
        if snake.collided {
            return false;
        }
        snake.collided = true;
        self.snapshots
            .insert(snake.id.clone(), RollbackSnapshot::capture(snake, now_ms));
        self.states
            .insert(snake.id.clone(), LifeState::OptimisticallyDead { since_ms: now_ms });
        true
    }

    /// Authoritative death notification for `id`.
    pub fn confirm_death(&mut self, id: &str) {
        self.states.insert(id.to_string(), LifeState::ConfirmedDead);
        self.snapshots.remove(id);
        self.reports.retain(|report| report.victim != id);
    }

    /// Drops every trace of `id`, e.g. when it rejoins or leaves the snapshot.
    pub fn forget(&mut self, id: &str) {
        self.states.remove(id);
        self.snapshots.remove(id);
        self.reports.retain(|report| report.victim != id);
    }

    /// Expires uncorroborated reports and rolls their victims back to the
    /// stored restore point. Reports about `me` are dropped without restore.
    /// Returns the ids that were rolled back.
    pub fn sweep(
        &mut self,
        now_ms: i64,
        me: Option<&str>,
        remotes: &mut HashMap<EntityId, RemoteSnake>,
    ) -> Vec<EntityId> {
        let (expired, pending): (Vec<PendingReport>, Vec<PendingReport>) = self
            .reports
            .drain(..)
            .partition(|report| now_ms - report.reported_at_ms > COLLISION_TIMEOUT_MS);
        self.reports = pending;

        let mut rolled_back = Vec::new();
        for report in expired {
            if Some(report.victim.as_str()) == me {
                continue;
            }
            tracing::debug!(victim = %report.victim, killer = %report.killer, "collision report expired");
            if self.rollback(&report.victim, remotes) {
                rolled_back.push(report.victim);
            }
        }

        self.snapshots
            .retain(|_, snapshot| now_ms - snapshot.taken_at_ms <= ROLLBACK_EXPIRY_MS);
        rolled_back
    }

    fn rollback(&mut self, id: &str, remotes: &mut HashMap<EntityId, RemoteSnake>) -> bool {
        if !matches!(self.state(id), LifeState::OptimisticallyDead { .. }) {
            return false;
        }
        let Some(snake) = remotes.get_mut(id) else {
            return false;
        };
        let Some(snapshot) = self.snapshots.remove(id) else {
            return false;
        };
        if !snake.collided {
            return false;
        }
        snake.segments = snapshot.segments;
        snake.collided = false;
        self.states.insert(id.to_string(), LifeState::Alive);
        tracing::debug!(victim = id, "optimistic death rolled back");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SnakeState;

    fn remote(id: &str) -> RemoteSnake {
        RemoteSnake::from_state(&SnakeState {
            id: id.to_string(),
            username: id.to_string(),
            color: 0,
            segments: (0..6)
                .map(|index| Segment::new(Vec2::new(index as f64 * 3.0, 1.0), 0.5))
                .collect(),
            length: 6,
            radius: 10.0,
            is_boosting: false,
            score: 12,
            cash: 1.0,
            is_spectator: false,
        })
    }

    fn tracked(snake: RemoteSnake) -> HashMap<EntityId, RemoteSnake> {
        HashMap::from([(snake.id.clone(), snake)])
    }

    #[test]
    fn uncorroborated_death_rolls_back_to_exact_snapshot() {
        let mut tracker = RollbackTracker::new();
        let mut remotes = tracked(remote("x"));
        let original = remotes["x"].segments.clone();

        let snake = remotes.get_mut("x").unwrap();
        tracker.record_report("x", "me", 0);
        assert!(tracker.mark_optimistic(snake, 0));
        snake.segments[0].x = 999.0;
        assert_eq!(tracker.state("x"), LifeState::OptimisticallyDead { since_ms: 0 });

        assert!(tracker.sweep(COLLISION_TIMEOUT_MS, Some("me"), &mut remotes).is_empty());
        let rolled = tracker.sweep(COLLISION_TIMEOUT_MS + 1, Some("me"), &mut remotes);

        assert_eq!(rolled, vec!["x".to_string()]);
        assert!(!remotes["x"].collided);
        assert_eq!(remotes["x"].segments, original);
        assert_eq!(tracker.state("x"), LifeState::Alive);
        assert_eq!(tracker.pending_reports(), 0);
    }

    #[test]
    fn corroborated_death_is_never_rolled_back() {
        let mut tracker = RollbackTracker::new();
        let mut remotes = tracked(remote("x"));
        tracker.record_report("x", "me", 0);
        tracker.mark_optimistic(remotes.get_mut("x").unwrap(), 0);

        tracker.confirm_death("x");
        let rolled = tracker.sweep(5_000, Some("me"), &mut remotes);

        assert!(rolled.is_empty());
        assert_eq!(tracker.state("x"), LifeState::ConfirmedDead);
        assert!(tracker.snapshot("x").is_none());
    }

    #[test]
    fn cooldown_suppresses_duplicate_reports() {
        let mut tracker = RollbackTracker::new();
        tracker.record_report("x", "me", 1_000);
        assert!(tracker.has_recent_report("x", 1_000 + REPORT_COOLDOWN_MS - 1));
        assert!(!tracker.has_recent_report("x", 1_000 + REPORT_COOLDOWN_MS));
        assert!(!tracker.has_recent_report("y", 1_000));
    }

    #[test]
    fn own_reports_expire_without_restore() {
        let mut tracker = RollbackTracker::new();
        let mut remotes = HashMap::new();
        tracker.record_report("me", "me", 0);
        assert!(tracker.sweep(COLLISION_TIMEOUT_MS + 1, Some("me"), &mut remotes).is_empty());
        assert_eq!(tracker.pending_reports(), 0);
    }

    #[test]
    fn restore_points_expire() {
        let mut tracker = RollbackTracker::new();
        let mut remotes = tracked(remote("x"));
        tracker.mark_optimistic(remotes.get_mut("x").unwrap(), 0);
        tracker.sweep(ROLLBACK_EXPIRY_MS + 1, None, &mut remotes);
        assert!(tracker.snapshot("x").is_none());
    }

    #[test]
    fn freezing_twice_keeps_first_snapshot() {
        let mut tracker = RollbackTracker::new();
        let mut remotes = tracked(remote("x"));
        let snake = remotes.get_mut("x").unwrap();
        assert!(tracker.mark_optimistic(snake, 0));
        assert!(!tracker.mark_optimistic(snake, 50));
        assert_eq!(tracker.snapshot("x").unwrap().taken_at_ms, 0);
    }
}
